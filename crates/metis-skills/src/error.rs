//! Error types for metis-skills

use thiserror::Error;

/// Skill error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete skill manifest; the directory is skipped
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Handler or argument schema is structurally wrong; the skill is excluded
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A handler failed during invocation
    #[error("execution error: {0}")]
    Execution(String),

    /// Filesystem error during a scan
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
