//! opwatch protocol types.
//!
//! This crate defines the data that flows through opwatch: the raw
//! change-log records read from a replication log, the document values they
//! carry, and the enriched change events published to subscribers.
//!
//! # Modules
//!
//! - [`value`] - Document values and the ordered field map
//! - [`record`] - Raw change-log records, operation codes, namespaces
//! - [`event`] - Change events and operation kinds
//! - [`error`] - Protocol error types
//!
//! # Example
//!
//! ```ignore
//! use opwatch_proto::{Document, RawChangeRecord};
//!
//! let record = RawChangeRecord::from_json(
//!     r#"{"op": "i", "ns": "shop.orders", "o": {"_id": 1, "total": 20}}"#,
//! )?;
//! assert_eq!(record.payload.get("_id"), Some(&Document::Int(1)));
//! ```

pub mod error;
pub mod event;
pub mod record;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use event::{ChangeEvent, OperationKind};
pub use record::{Namespace, OpCode, RawChangeRecord};
pub use value::{Document, Fields, Shape};

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Prefix marking an update-operator key (`$set`, `$inc`, ...).
pub const OPERATOR_PREFIX: char = '$';
