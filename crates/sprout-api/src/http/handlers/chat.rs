//! Chat message endpoint.
//!
//! POST /api/v1/chat
//!
//! Validates the request, builds the context string from the most recent
//! stored summaries (degrading to empty on repository failure), calls the
//! chat responder, then runs the lifecycle orchestrator. Any upstream fault
//! yields the fixed friendly fallback reply rather than an error payload --
//! the caller is a child-facing client.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sprout_core::conversation::repository::ConversationRepository;
use sprout_core::responder::ChatResponder;

use crate::http::error::AppError;
use crate::state::AppState;

/// Fixed reply used whenever the turn cannot be completed.
pub const FALLBACK_REPLY: &str = "Oops! Let's try that again.";

/// Request body for the chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub force_start: bool,
}

/// Response body for the chat endpoint.
///
/// The boundary flags are present only when set, matching the client
/// contract (`conversation_started` / `conversation_ended`).
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_ended: Option<bool>,
}

impl ChatResponse {
    fn fallback() -> Self {
        Self {
            response: FALLBACK_REPLY.to_string(),
            conversation_started: None,
            conversation_ended: None,
        }
    }
}

/// POST /api/v1/chat - process one message turn.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let user_id = body.user_id.trim();
    let message = body.message.trim();
    if user_id.is_empty() || message.is_empty() {
        return Err(AppError::Validation(
            "user_id and message are required".to_string(),
        ));
    }

    info!(user_id, "new chat message");

    // Context degrades to empty rather than failing the turn
    let context = match state
        .conversation_service
        .repo()
        .recent_summaries(user_id, state.config.context_summary_limit)
        .await
    {
        Ok(summaries) => summaries.join("\n"),
        Err(err) => {
            warn!(user_id, %err, "context unavailable, proceeding without it");
            String::new()
        }
    };

    let reply = match state.responder.respond(&context, message).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(user_id, %err, "chat responder failed");
            return Ok(Json(ChatResponse::fallback()));
        }
    };

    let outcome = state
        .conversation_service
        .handle_message(user_id, message, &reply, body.force_start)
        .await;

    Ok(Json(ChatResponse {
        response: outcome.reply,
        conversation_started: outcome.started.then_some(true),
        conversation_ended: outcome.ended.then_some(true),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_flags_are_omitted_when_unset() {
        let response = ChatResponse {
            response: "Hi!".to_string(),
            conversation_started: None,
            conversation_ended: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"response":"Hi!"}"#);
    }

    #[test]
    fn boundary_flags_serialize_when_set() {
        let response = ChatResponse {
            response: "Bye!".to_string(),
            conversation_started: None,
            conversation_ended: Some(true),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"conversation_ended\":true"));
        assert!(!json.contains("conversation_started"));
    }

    #[test]
    fn force_start_defaults_to_false() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"user_id":"u1","message":"hello"}"#).unwrap();
        assert!(!request.force_start);
    }
}
