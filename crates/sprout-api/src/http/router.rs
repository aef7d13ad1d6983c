//! Axum router configuration with middleware.
//!
//! All API routes are under `/api/v1/`; health checks live at the root.
//! Middleware: permissive CORS (the client is a static web app on another
//! origin) and HTTP tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/conversations/{user_id}",
            get(handlers::conversation::list_conversations),
        )
        .route(
            "/conversations/{user_id}/status",
            get(handlers::conversation::conversation_status),
        )
        .route(
            "/conversations/{user_id}/end",
            post(handlers::conversation::end_conversation),
        )
        .route(
            "/conversations/{user_id}/activity",
            post(handlers::conversation::record_activity),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health::health))
        .route("/health/db", get(handlers::health::db_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
