//! Chat responder port.
//!
//! The responder produces the assistant's reply for a turn and may embed the
//! configured end-of-conversation marker. It is called by the HTTP layer
//! before the lifecycle orchestrator runs; the core never awaits it while
//! holding any lock.

use sprout_types::error::UpstreamError;

/// Reply-generating collaborator (an LLM in production).
pub trait ChatResponder: Send + Sync {
    /// Produce the assistant reply for `message`, given a context string
    /// built from prior conversation summaries (may be empty).
    fn respond(
        &self,
        context: &str,
        message: &str,
    ) -> impl std::future::Future<Output = Result<String, UpstreamError>> + Send;
}
