//! Summarizer port and transcript formatting.
//!
//! Implementations live in sprout-infra (e.g., the DeepSeek client). Both
//! summarize calls go to an LLM and may fail; the finalize pipeline degrades
//! to a fixed placeholder instead of aborting.

use sprout_types::conversation::ConversationMessage;
use sprout_types::error::UpstreamError;

/// Placeholder stored when summary generation fails.
pub const SUMMARY_FALLBACK: &str = "Summary generation failed";

/// Summarization collaborator.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition), the same
/// pattern as [`ConversationRepository`](crate::conversation::repository::ConversationRepository).
pub trait Summarizer: Send + Sync {
    /// Summarize a single conversation transcript.
    fn summarize(
        &self,
        transcript: &str,
    ) -> impl std::future::Future<Output = Result<String, UpstreamError>> + Send;

    /// Summarize a whole session (several conversations' transcripts).
    fn summarize_session(
        &self,
        transcript: &str,
    ) -> impl std::future::Future<Output = Result<String, UpstreamError>> + Send;

    /// Extract topic labels from a transcript.
    fn extract_topics(
        &self,
        transcript: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, UpstreamError>> + Send;
}

/// Render messages as a `sender: text` transcript for the summarizer.
pub fn format_transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}
