//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Namespace is not of the form `<database>.<collection>`.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// Object id is not 24 hexadecimal characters.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
