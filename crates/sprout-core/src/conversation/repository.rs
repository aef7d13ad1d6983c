//! ConversationRepository trait definition.
//!
//! Provides persistence operations for conversation records.
//! Implementations live in sprout-infra (e.g., `SqliteConversationRepository`).
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use sprout_types::conversation::{ConversationRecord, EndReason};
use sprout_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for conversation record persistence.
pub trait ConversationRepository: Send + Sync {
    /// Durably write a conversation record, returning its id.
    fn save(
        &self,
        record: &ConversationRecord,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// The user's most recent record, complete or not.
    fn get_last(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ConversationRecord>, RepositoryError>> + Send;

    /// The user's most recent *completed* record.
    fn get_last_completed(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ConversationRecord>, RepositoryError>> + Send;

    /// Whether an incomplete record exists for the user.
    fn has_incomplete(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All incomplete records for the user, oldest first.
    fn get_incomplete(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationRecord>, RepositoryError>> + Send;

    /// Mark the user's incomplete record complete with the given reason.
    ///
    /// Returns `true` when a record was updated.
    fn mark_ended(
        &self,
        user_id: &str,
        reason: EndReason,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Refresh the last-activity timestamp on the user's incomplete record.
    /// A missing incomplete record is not an error.
    fn touch_activity(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The newest `limit` summaries for the user, newest first.
    fn recent_summaries(
        &self,
        user_id: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Attach the session-level summary to the user's newest ended record.
    fn update_session_summary(
        &self,
        user_id: &str,
        summary: &str,
        message_count: u32,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All records for the user, newest first.
    fn list_for_user(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationRecord>, RepositoryError>> + Send;

    /// Total stored conversations (health reporting).
    fn count_conversations(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
