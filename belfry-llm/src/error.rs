//! LLM error types.

use thiserror::Error;

/// Errors that can occur while obtaining a roleplay reply.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed at the transport level.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// A response could not be parsed.
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// The provider is busy or rate limited.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// The model or endpoint cannot serve this request. Never retried.
    #[error("LLM request rejected ({status}): {message}")]
    Permanent {
        /// HTTP status, or the provider's error code.
        status: u16,
        /// Reason and body.
        message: String,
    },

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),

    /// The local worker process failed or replied with an error.
    #[error("LLM worker error: {0}")]
    Worker(String),

    /// The session was cancelled before a reply arrived.
    #[error("LLM request cancelled")]
    Cancelled,

    /// Pipe or process I/O failed.
    #[error("LLM I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
