//! Error types for the game shell.

use belfry_core::CoreError;
use belfry_llm::LlmError;
use thiserror::Error;

/// Errors raised while composing or running a session.
///
/// Turn-level failures never appear here; they are reported in the
/// [`TurnReport`](crate::engine::TurnReport) and the session carries on.
#[derive(Error, Debug)]
pub enum GameError {
    /// Layered configuration could not be built or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The world file or core configuration is unusable.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A roleplay provider could not be constructed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The politeness service answered with something unusable.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Console or state dump I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GameError>;
