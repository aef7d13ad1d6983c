//! Conversation persistence port and lifecycle orchestration.

pub mod repository;
pub mod service;

pub use repository::ConversationRepository;
pub use service::{ConversationService, EndOutcome, MessageOutcome};
