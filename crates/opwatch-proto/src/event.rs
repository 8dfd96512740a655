//! Change events published to subscribers.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::record::RawChangeRecord;
use crate::value::{Document, Fields};

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A document was inserted.
    Insert,
    /// A document was updated.
    Update,
    /// A document was deleted.
    Delete,
}

impl OperationKind {
    /// Name used as the event-name prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Parse an event-name prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "insert" => Some(OperationKind::Insert),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enriched change event.
///
/// Events are built once and then shared behind an `Arc`; nothing mutates
/// them after publication.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The record this event was derived from.
    pub source_record: Arc<RawChangeRecord>,
    /// Kind of change.
    pub operation_kind: OperationKind,
    /// Identifier of the affected document.
    pub document_id: Document,
    /// Best-effort current document body.
    ///
    /// The raw payload for inserts and deletes; for updates the document as
    /// re-fetched after the mutation, or `None` if it could not be fetched.
    pub document: Option<Document>,
    /// Raw insert/delete body or raw update-operator payload.
    pub mutation_payload: Document,
    /// Dot path of the changed property. Empty for inserts and deletes.
    pub changed_path: String,
    /// Value at `changed_path` within `document`, when both are known.
    pub current_value: Option<Document>,
    /// Update selector. An empty object for inserts and deletes.
    pub selector: Document,
    /// Name this event is published under.
    pub event_name: String,
}

impl ChangeEvent {
    /// Read a dot path out of the event's fields.
    ///
    /// The first segment names a field (`document`, `changed_path`,
    /// `source_record`, ...), the rest walks into its value. Absent optional
    /// fields resolve to `None`.
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Document>> {
        let (head, rest) = path.split_once('.').unwrap_or((path, ""));
        let root: Cow<'_, Document> = match head {
            "source_record" => Cow::Owned(self.source_record.to_document()),
            "operation_kind" => Cow::Owned(Document::from(self.operation_kind.as_str())),
            "document_id" => Cow::Borrowed(&self.document_id),
            "document" => Cow::Borrowed(self.document.as_ref()?),
            "mutation_payload" => Cow::Borrowed(&self.mutation_payload),
            "changed_path" => Cow::Owned(Document::from(self.changed_path.as_str())),
            "current_value" => Cow::Borrowed(self.current_value.as_ref()?),
            "selector" => Cow::Borrowed(&self.selector),
            "event_name" => Cow::Owned(Document::from(self.event_name.as_str())),
            _ => return None,
        };
        match root {
            Cow::Borrowed(doc) => doc.get_path(rest).map(Cow::Borrowed),
            Cow::Owned(doc) => doc.get_path(rest).cloned().map(Cow::Owned),
        }
    }

    /// The whole event as a document, e.g. for JSON output.
    pub fn to_document(&self) -> Document {
        Document::Object(
            Fields::new()
                .with("event_name", self.event_name.as_str())
                .with("operation_kind", self.operation_kind.as_str())
                .with("document_id", self.document_id.clone())
                .with("document", self.document.clone())
                .with("mutation_payload", self.mutation_payload.clone())
                .with("changed_path", self.changed_path.as_str())
                .with("current_value", self.current_value.clone())
                .with("selector", self.selector.clone())
                .with("source_record", self.source_record.to_document()),
        )
    }
}
