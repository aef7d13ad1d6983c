//! Conversation management endpoints.
//!
//! Endpoints:
//! - POST /api/v1/conversations/{user_id}/end      - explicit out-of-band end
//! - POST /api/v1/conversations/{user_id}/activity - auto-save activity ping
//! - GET  /api/v1/conversations/{user_id}/status   - active-conversation check
//! - GET  /api/v1/conversations/{user_id}          - stored conversations

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use sprout_core::conversation::repository::ConversationRepository;
use sprout_types::conversation::EndReason;

use crate::http::error::AppError;
use crate::state::AppState;

/// Request body for the explicit-end endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct EndRequest {
    /// Client-reported end reason (e.g. "page_close"). Unknown values fall
    /// back to `page_close`.
    pub action: Option<String>,
}

/// POST /api/v1/conversations/{user_id}/end - end without a new message.
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<EndRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }

    let action = body
        .and_then(|Json(b)| b.action)
        .unwrap_or_else(|| "page_close".to_string());
    let reason = action.parse::<EndReason>().unwrap_or(EndReason::PageClose);

    let outcome = state
        .conversation_service
        .handle_explicit_end(&user_id, reason)
        .await;

    if !outcome.ended {
        return Err(AppError::Validation(
            "no messages found to end".to_string(),
        ));
    }

    info!(user_id, %reason, message_count = outcome.message_count, "conversation ended by client");

    Ok(Json(json!({
        "status": "conversation_ended",
        "message_count": outcome.message_count,
    })))
}

/// POST /api/v1/conversations/{user_id}/activity - periodic auto-save ping.
pub async fn record_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .conversation_service
        .repo()
        .touch_activity(&user_id)
        .await?;

    Ok(Json(json!({ "status": "auto_saved" })))
}

/// Response body for the status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub new_conversation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// GET /api/v1/conversations/{user_id}/status - active-conversation check.
pub async fn conversation_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let active = state.conversation_service.is_active(&user_id).await;
    let last = state.conversation_service.repo().get_last(&user_id).await?;

    Ok(Json(StatusResponse {
        active,
        new_conversation: last.is_none() && !active,
        last_activity: last.map(|record| record.last_activity),
    }))
}

/// Query parameters for conversation listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub summary: bool,
}

/// Summarized view of one stored conversation (no messages).
#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub topics: Vec<String>,
    pub complete: bool,
    pub message_count: usize,
}

/// GET /api/v1/conversations/{user_id} - stored conversations, raw or
/// summarized (`?summary=true`).
pub async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = state
        .conversation_service
        .repo()
        .list_for_user(&user_id)
        .await?;

    if query.summary {
        let conversations: Vec<ConversationView> = records
            .iter()
            .map(|record| ConversationView {
                timestamp: record.created_at,
                summary: record.summary.clone(),
                topics: record.topics.clone(),
                complete: record.complete,
                message_count: record.messages.len(),
            })
            .collect();

        Ok(Json(json!({
            "user_id": user_id,
            "conversation_count": conversations.len(),
            "conversations": conversations,
        })))
    } else {
        Ok(Json(serde_json::to_value(&records).map_err(|e| {
            AppError::Internal(format!("serialization failed: {e}"))
        })?))
    }
}
