//! Error types for metis-core

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// A role produced output that is not parseable structured data
    #[error("format error: {0}")]
    Format(String),

    /// A skill handler failed during invocation
    #[error("execution error: {0}")]
    Execution(String),

    /// Completion service failure
    #[error("llm error: {0}")]
    Llm(#[from] metis_llm::Error),

    /// Skill registry failure
    #[error("skill error: {0}")]
    Skills(#[from] metis_skills::Error),

    /// Session store failure
    #[error("session error: {0}")]
    Session(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
