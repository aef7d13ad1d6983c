use thiserror::Error;

/// Errors from repository operations (used by trait definitions in sprout-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from upstream collaborators (chat responder, summarizer).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream timed out after {0} seconds")]
    Timeout(u64),

    #[error("upstream API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_upstream_error_display() {
        let err = UpstreamError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));

        let err = UpstreamError::Timeout(15);
        assert!(err.to_string().contains("15"));
    }
}
