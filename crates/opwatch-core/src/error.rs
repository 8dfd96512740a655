//! Core error types.

use thiserror::Error;

/// Errors raised while turning change records into events.
///
/// None of these escape the dispatcher; they are reported through the
/// configured logger and the offending record is dropped or left unenriched.
#[derive(Debug, Error)]
pub enum Error {
    /// The record's operation code is not insert, update or delete.
    #[error("unsupported operation kind: {0:?}")]
    UnsupportedOperation(String),

    /// The record is missing a field the event needs.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A collection handle could not be acquired.
    #[error("collection unavailable: {0}")]
    CollectionUnavailable(String),

    /// Re-fetching the updated document failed.
    #[error("document lookup failed: {0}")]
    Lookup(String),

    /// A one-shot listener was dropped before it matched.
    #[error("listener dropped before a matching event arrived")]
    ListenerDropped,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
