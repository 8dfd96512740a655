//! Raw change-log records as produced by the log tailer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::event::OperationKind;
use crate::value::{Document, Fields};

/// Operation code of a change-log record.
///
/// Unknown codes (no-ops, commands) are kept verbatim so that they reach the
/// event builder and are rejected there rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OpCode {
    /// `i`
    Insert,
    /// `u`
    Update,
    /// `d`
    Delete,
    /// Any other code.
    Other(String),
}

impl OpCode {
    /// The wire code.
    pub fn code(&self) -> &str {
        match self {
            OpCode::Insert => "i",
            OpCode::Update => "u",
            OpCode::Delete => "d",
            OpCode::Other(code) => code,
        }
    }

    /// The operation kind this code maps to, if it is one we publish.
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            OpCode::Insert => Some(OperationKind::Insert),
            OpCode::Update => Some(OperationKind::Update),
            OpCode::Delete => Some(OperationKind::Delete),
            OpCode::Other(_) => None,
        }
    }
}

impl From<&str> for OpCode {
    fn from(code: &str) -> Self {
        match code {
            "i" => OpCode::Insert,
            "u" => OpCode::Update,
            "d" => OpCode::Delete,
            other => OpCode::Other(other.to_string()),
        }
    }
}

impl From<String> for OpCode {
    fn from(code: String) -> Self {
        OpCode::from(code.as_str())
    }
}

impl From<OpCode> for String {
    fn from(op: OpCode) -> Self {
        op.code().to_string()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A `<database>.<collection>` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Parse a namespace string.
    ///
    /// The split happens at the first `.`; collection names may themselves
    /// contain dots (`app.system.users` is collection `system.users`).
    pub fn parse(ns: &str) -> Result<Self, Error> {
        match ns.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    database: database.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => Err(Error::InvalidNamespace(ns.to_string())),
        }
    }

    /// Database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// One entry of the replication log.
///
/// Field names on the wire follow the oplog (`op`, `ns`, `o`, `o2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeRecord {
    /// Operation code.
    pub op: OpCode,
    /// `<database>.<collection>` the operation applied to.
    #[serde(rename = "ns")]
    pub namespace: String,
    /// Inserted/deleted document, or the update-operator payload.
    #[serde(rename = "o", default)]
    pub payload: Document,
    /// Update selector identifying the target document. Updates only.
    #[serde(rename = "o2", default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Document>,
}

impl RawChangeRecord {
    /// Create an insert record.
    pub fn insert(namespace: impl Into<String>, document: impl Into<Document>) -> Self {
        Self {
            op: OpCode::Insert,
            namespace: namespace.into(),
            payload: document.into(),
            selector: None,
        }
    }

    /// Create an update record.
    pub fn update(
        namespace: impl Into<String>,
        selector: impl Into<Document>,
        payload: impl Into<Document>,
    ) -> Self {
        Self {
            op: OpCode::Update,
            namespace: namespace.into(),
            payload: payload.into(),
            selector: Some(selector.into()),
        }
    }

    /// Create a delete record.
    pub fn delete(namespace: impl Into<String>, document: impl Into<Document>) -> Self {
        Self {
            op: OpCode::Delete,
            namespace: namespace.into(),
            payload: document.into(),
            selector: None,
        }
    }

    /// Parse a record from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Parse the namespace.
    pub fn parsed_namespace(&self) -> Result<Namespace, Error> {
        Namespace::parse(&self.namespace)
    }

    /// The record as a document keyed by its wire field names.
    pub fn to_document(&self) -> Document {
        let mut fields = Fields::new()
            .with("op", self.op.code())
            .with("ns", self.namespace.as_str())
            .with("o", self.payload.clone());
        if let Some(selector) = &self.selector {
            fields.insert("o2", selector.clone());
        }
        Document::Object(fields)
    }
}
