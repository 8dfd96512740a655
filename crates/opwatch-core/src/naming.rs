//! Event naming.
//!
//! Every published event is addressed as `<kind>:<database>.<collection>`,
//! with updates additionally suffixed by the changed path:
//!
//! ```text
//! insert:shop.orders
//! delete:shop.orders
//! update:shop.orders.shipping.address.city
//! ```

use opwatch_proto::OperationKind;

/// Build an event name.
///
/// `changed_path` is appended verbatim and, when non-empty, is expected to
/// start with `.`.
pub fn event_name(kind: OperationKind, namespace: &str, changed_path: &str) -> String {
    format!("{}:{}{}", kind.as_str(), namespace, changed_path)
}

/// Name of insert events for a namespace.
pub fn insert_event(namespace: &str) -> String {
    event_name(OperationKind::Insert, namespace, "")
}

/// Name of delete events for a namespace.
pub fn delete_event(namespace: &str) -> String {
    event_name(OperationKind::Delete, namespace, "")
}

/// Name of update events for a property path (without leading dot).
pub fn update_event(namespace: &str, path: &str) -> String {
    format!("{}:{}.{}", OperationKind::Update.as_str(), namespace, path)
}

/// Split an event name into its kind and the address after the colon.
pub fn parse_event_name(name: &str) -> Option<(OperationKind, &str)> {
    let (kind, address) = name.split_once(':')?;
    Some((OperationKind::from_name(kind)?, address))
}
