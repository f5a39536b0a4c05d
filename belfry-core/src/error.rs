//! Error types for the belfry core library.

use thiserror::Error;

/// Top-level error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A world file could not be parsed.
    #[error("World file error: {0}")]
    World(String),

    /// A knowledge-base query failed.
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single knowledge-base query.
///
/// Callers treat these as "unresolved" for the query that raised them; they
/// never abort a turn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    /// The query referenced an NPC the knowledge base does not know.
    #[error("Unknown NPC: {0}")]
    UnknownNpc(String),

    /// The backing store rejected or failed the query.
    #[error("Knowledge query failed: {0}")]
    Query(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
