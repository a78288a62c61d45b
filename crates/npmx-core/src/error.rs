//! Error types for npmx.

use thiserror::Error;

/// The main error type for npmx operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Package manager executable not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to start {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("Failed to parse command output: {0}")]
    Parse(String),

    #[error("Invalid package manifest: {0}")]
    Manifest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
