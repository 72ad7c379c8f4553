// The Moderator capability: classify a piece of text and return a verdict.
//
// Implementations live in infra (remote classifiers) or in tests (stubs).
// The processor picks one at construction time and talks to it only
// through this trait.

use super::moderation_models::Verdict;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModerationError {
    #[error("Classification timed out")]
    Timeout,

    /// Network failure, rate limiting or a 5xx from the backend.
    #[error("Moderation backend unavailable: {0}")]
    Transient(String),

    #[error("Moderation backend rejected the credentials: {0}")]
    InvalidCredential(String),

    /// The backend refused this particular request (e.g. a 400).
    #[error("Moderation backend rejected the request: {0}")]
    Rejected(String),

    #[error("Moderation backend is misconfigured: {0}")]
    Configuration(String),
}

impl ModerationError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModerationError::Transient(_))
    }
}

#[async_trait]
pub trait Moderator: Send + Sync {
    /// Classify `text`.
    ///
    /// Blank text must come back as [`Verdict::safe`] without any outbound
    /// call. Callers bound this with a deadline by dropping the future, so
    /// implementations must not spawn work that outlives it.
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ModerationError::Transient("502".into()).is_retryable());
        assert!(!ModerationError::Timeout.is_retryable());
        assert!(!ModerationError::InvalidCredential("401".into()).is_retryable());
        assert!(!ModerationError::Rejected("400".into()).is_retryable());
        assert!(!ModerationError::Configuration("bad".into()).is_retryable());
    }
}
