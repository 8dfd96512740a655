//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Feed error.
    #[error("feed error: {0}")]
    Core(#[from] opwatch_core::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The dispatcher stopped accepting records.
    #[error("dispatcher closed")]
    DispatcherClosed,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;
