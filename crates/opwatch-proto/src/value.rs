//! Document values carried by change records and events.

use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use crate::error::Error;

/// Extended JSON key for object ids.
const OID_KEY: &str = "$oid";

/// Extended JSON key for dates.
const DATE_KEY: &str = "$date";

/// Extended JSON key for 64-bit integers.
const LONG_KEY: &str = "$numberLong";

/// Extended JSON key for 32-bit integers.
const INT_KEY: &str = "$numberInt";

/// Extended JSON key for doubles.
const DOUBLE_KEY: &str = "$numberDouble";

/// Keys of extended JSON wrappers, canonical and legacy forms.
///
/// An object whose keys all come from this set is a wrapped driver value,
/// never a sub-document.
const WRAPPER_KEYS: &[&str] = &[
    OID_KEY,
    DATE_KEY,
    LONG_KEY,
    INT_KEY,
    DOUBLE_KEY,
    "$numberDecimal",
    "$timestamp",
    "$binary",
    "$type",
    "$uuid",
    "$regularExpression",
    "$regex",
    "$options",
    "$code",
    "$scope",
    "$symbol",
    "$dbPointer",
    "$minKey",
    "$maxKey",
    "$undefined",
];

/// An insertion-ordered map of field names to document values.
///
/// Key order matters: paths are reported in the order fields appear in the
/// change record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Document)>,
}

impl Fields {
    /// Create an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Document>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Document>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get a field by name.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Check whether a field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Document>> FromIterator<(K, V)> for Fields {
    /// Later duplicates replace earlier values in place.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries: Vec<(String, Document)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (k, v) in iter {
            let key = k.into();
            let value = v.into();
            match positions.get(&key) {
                Some(&at) => entries[at].1 = value,
                None => {
                    positions.insert(key.clone(), entries.len());
                    entries.push((key, value));
                }
            }
        }
        Fields { entries }
    }
}

/// How path traversal treats a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Null, booleans, numbers and strings.
    Scalar,
    /// Arrays. Never descended into.
    Sequence,
    /// Plain objects. The only shape with child paths.
    Associative,
    /// Wrapped driver types (object ids, dates, decimals, binaries, ...).
    /// Leaves, like scalars.
    Opaque,
}

/// A document value.
///
/// This is the closed set of shapes a change-record payload can take. Object
/// ids and dates are kept as wrapped leaves so they are never walked into as
/// if they were sub-documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Json", into = "Json")]
pub enum Document {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// 12-byte object identifier.
    ObjectId([u8; 12]),
    /// Date as milliseconds since Unix epoch.
    Date(i64),
    /// Ordered list of values.
    Array(Vec<Document>),
    /// Ordered map of fields.
    Object(Fields),
    /// Extended JSON wrapper with no native variant (`$numberDecimal`,
    /// `$timestamp`, `$binary`, ...), kept verbatim.
    Extended(Fields),
}

impl Document {
    /// Create an empty object.
    pub fn object() -> Self {
        Document::Object(Fields::new())
    }

    /// Parse an object id from its 24-character hex form.
    pub fn object_id(hex_id: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_id).map_err(|_| Error::InvalidObjectId(hex_id.to_string()))?;
        let id: [u8; 12] = bytes
            .try_into()
            .map_err(|_| Error::InvalidObjectId(hex_id.to_string()))?;
        Ok(Document::ObjectId(id))
    }

    /// Classify this value for path traversal.
    pub fn shape(&self) -> Shape {
        match self {
            Document::Null
            | Document::Bool(_)
            | Document::Int(_)
            | Document::Float(_)
            | Document::String(_) => Shape::Scalar,
            Document::ObjectId(_) | Document::Date(_) | Document::Extended(_) => Shape::Opaque,
            Document::Array(_) => Shape::Sequence,
            Document::Object(_) => Shape::Associative,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Document::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Document::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Float(f) => Some(*f),
            Document::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as object fields.
    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Document::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[Document]> {
        match self {
            Document::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get a top-level field of an object.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Look up a dot-separated path.
    ///
    /// Object segments are field names, array segments are decimal indices.
    /// The empty path returns the value itself.
    pub fn get_path(&self, path: &str) -> Option<&Document> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Document::Object(fields) => fields.get(segment),
            Document::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Convert to a JSON value using extended JSON for wrapped types.
    pub fn to_json(&self) -> Json {
        match self {
            Document::Null => Json::Null,
            Document::Bool(b) => Json::Bool(*b),
            Document::Int(i) => Json::Number((*i).into()),
            Document::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Document::String(s) => Json::String(s.clone()),
            Document::ObjectId(id) => {
                let mut map = Map::new();
                map.insert(OID_KEY.to_string(), Json::String(hex::encode(id)));
                Json::Object(map)
            }
            Document::Date(millis) => {
                let mut map = Map::new();
                map.insert(DATE_KEY.to_string(), Json::Number((*millis).into()));
                Json::Object(map)
            }
            Document::Array(items) => Json::Array(items.iter().map(Document::to_json).collect()),
            Document::Object(fields) | Document::Extended(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Recognise extended JSON wrappers.
    ///
    /// Object ids, dates and the numeric wrappers map to native variants.
    /// Any other wrapper, or one whose payload does not parse, stays an
    /// opaque [`Document::Extended`].
    fn from_extended(map: &Map<String, Json>) -> Option<Self> {
        if map.is_empty() || !map.keys().all(|key| WRAPPER_KEYS.contains(&key.as_str())) {
            return None;
        }
        let native = match map.iter().next() {
            Some((key, value)) if map.len() == 1 => Self::native_wrapper(key, value),
            _ => None,
        };
        Some(native.unwrap_or_else(|| {
            Document::Extended(
                map.iter()
                    .map(|(k, v)| (k.clone(), Document::from(v.clone())))
                    .collect(),
            )
        }))
    }

    fn native_wrapper(key: &str, value: &Json) -> Option<Self> {
        match (key, value) {
            (OID_KEY, Json::String(hex_id)) => Document::object_id(hex_id).ok(),
            (DATE_KEY, Json::Number(millis)) => millis.as_i64().map(Document::Date),
            (DATE_KEY, Json::String(text)) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|at| Document::Date(at.timestamp_millis())),
            (DATE_KEY, Json::Object(inner)) => match inner.get(LONG_KEY) {
                Some(Json::String(millis)) if inner.len() == 1 => {
                    millis.parse().ok().map(Document::Date)
                }
                _ => None,
            },
            (LONG_KEY, Json::String(text)) => text.parse().ok().map(Document::Int),
            (INT_KEY, Json::String(text)) => text.parse::<i32>().ok().map(Document::from),
            (DOUBLE_KEY, Json::String(text)) => text.parse().ok().map(Document::Float),
            _ => None,
        }
    }
}

impl From<Json> for Document {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Document::Null,
            Json::Bool(b) => Document::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Document::Int(i),
                None => Document::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Document::String(s),
            Json::Array(items) => Document::Array(items.into_iter().map(Document::from).collect()),
            Json::Object(map) => match Document::from_extended(&map) {
                Some(wrapped) => wrapped,
                // Keys of a parsed map are already unique.
                None => Document::Object(Fields {
                    entries: map
                        .into_iter()
                        .map(|(k, v)| (k, Document::from(v)))
                        .collect(),
                }),
            },
        }
    }
}

impl From<Document> for Json {
    fn from(doc: Document) -> Self {
        doc.to_json()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// Conversion implementations
impl From<bool> for Document {
    fn from(v: bool) -> Self {
        Document::Bool(v)
    }
}

impl From<i32> for Document {
    fn from(v: i32) -> Self {
        Document::Int(v as i64)
    }
}

impl From<i64> for Document {
    fn from(v: i64) -> Self {
        Document::Int(v)
    }
}

impl From<f64> for Document {
    fn from(v: f64) -> Self {
        Document::Float(v)
    }
}

impl From<String> for Document {
    fn from(v: String) -> Self {
        Document::String(v)
    }
}

impl From<&str> for Document {
    fn from(v: &str) -> Self {
        Document::String(v.to_string())
    }
}

impl From<Vec<Document>> for Document {
    fn from(v: Vec<Document>) -> Self {
        Document::Array(v)
    }
}

impl From<Fields> for Document {
    fn from(v: Fields) -> Self {
        Document::Object(v)
    }
}

impl<T: Into<Document>> From<Option<T>> for Document {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Document::Null,
        }
    }
}
