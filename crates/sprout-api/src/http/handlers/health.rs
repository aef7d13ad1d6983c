//! Health check endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use sprout_core::conversation::repository::ConversationRepository;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /health - service liveness.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "sprout",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health/db - database connectivity and record count.
pub async fn db_health(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state
        .conversation_service
        .repo()
        .count_conversations()
        .await?;

    Ok(Json(json!({
        "status": "success",
        "conversations_count": count,
    })))
}
