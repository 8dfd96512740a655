//! Event construction from raw change records.
//!
//! Inserts and deletes map to exactly one event. Updates map to one event
//! per leaf path found under the payload's operator keys (`$set`, `$inc`,
//! ...), and are enriched with the document as re-read after the update when
//! the database has a live connection.

use std::sync::Arc;

use opwatch_proto::{
    ChangeEvent, Document, Namespace, OperationKind, RawChangeRecord, ID_FIELD, OPERATOR_PREFIX,
};

use crate::error::{Error, Result};
use crate::logger::SharedLogger;
use crate::naming::event_name;
use crate::paths::compute_paths;
use crate::registry::{ConnectionRegistry, DatabaseHandle};

/// Changed paths of an update payload.
///
/// Only operator keys are walked, in payload order. The same path touched by
/// two operators is reported twice. A payload without operator keys is a
/// whole-document replacement and yields nothing.
pub fn update_paths(payload: &Document) -> Vec<String> {
    let Some(fields) = payload.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(key, _)| key.starts_with(OPERATOR_PREFIX))
        .flat_map(|(_, body)| compute_paths(body))
        .collect()
}

/// Builds change events from raw records.
pub struct EventBuilder {
    registry: Arc<ConnectionRegistry>,
    logger: SharedLogger,
}

impl EventBuilder {
    /// Create a builder over a connection registry.
    pub fn new(registry: Arc<ConnectionRegistry>, logger: SharedLogger) -> Self {
        Self { registry, logger }
    }

    /// Build the events for one record.
    ///
    /// Errors mean the record yields no events at all. Enrichment failures
    /// are not errors: they are logged and the events go out without a
    /// document.
    pub async fn build(&self, record: &RawChangeRecord) -> Result<Vec<ChangeEvent>> {
        let kind = record
            .op
            .kind()
            .ok_or_else(|| Error::UnsupportedOperation(record.op.code().to_string()))?;

        let namespace = record
            .parsed_namespace()
            .map_err(|e| Error::MalformedRecord(e.to_string()))?;
        let source = Arc::new(record.clone());

        match kind {
            OperationKind::Insert | OperationKind::Delete => {
                Ok(vec![document_event(kind, &namespace, source)?])
            }
            OperationKind::Update => self.update_events(&namespace, source).await,
        }
    }

    async fn update_events(
        &self,
        namespace: &Namespace,
        source: Arc<RawChangeRecord>,
    ) -> Result<Vec<ChangeEvent>> {
        let selector = source
            .selector
            .clone()
            .ok_or_else(|| Error::MalformedRecord(format!("update on {namespace} has no selector")))?;
        let document_id = selector.get(ID_FIELD).cloned().ok_or_else(|| {
            Error::MalformedRecord(format!("update selector on {namespace} has no {ID_FIELD}"))
        })?;

        let paths = update_paths(&source.payload);
        if paths.is_empty() {
            tracing::trace!(namespace = %namespace, "update without operator paths, nothing to emit");
            return Ok(Vec::new());
        }

        let document = match self.registry.get(namespace.database()) {
            Some(handle) => self.refetch(handle, namespace, &document_id).await,
            None => None,
        };

        let events = paths
            .into_iter()
            .map(|path| ChangeEvent {
                source_record: Arc::clone(&source),
                operation_kind: OperationKind::Update,
                document_id: document_id.clone(),
                current_value: document
                    .as_ref()
                    .and_then(|doc| doc.get_path(&path))
                    .cloned(),
                document: document.clone(),
                mutation_payload: source.payload.clone(),
                event_name: event_name(OperationKind::Update, &source.namespace, &format!(".{path}")),
                changed_path: path,
                selector: selector.clone(),
            })
            .collect();
        Ok(events)
    }

    /// Re-read the updated document. Any failure degrades to `None`.
    async fn refetch(
        &self,
        handle: &Arc<dyn DatabaseHandle>,
        namespace: &Namespace,
        id: &Document,
    ) -> Option<Document> {
        let collection = match handle.collection(namespace.collection()) {
            Ok(collection) => collection,
            Err(e) => {
                self.logger.error(&format!("cannot open collection {namespace}: {e}"));
                return None;
            }
        };

        match collection.find_one(id).await {
            Ok(Some(document)) => Some(document),
            Ok(None) => {
                self.logger
                    .debug(&format!("document {id} in {namespace} not found after update"));
                None
            }
            Err(e) => {
                self.logger
                    .error(&format!("re-fetch of document {id} in {namespace} failed: {e}"));
                None
            }
        }
    }
}

fn document_event(
    kind: OperationKind,
    namespace: &Namespace,
    source: Arc<RawChangeRecord>,
) -> Result<ChangeEvent> {
    let document_id = source.payload.get(ID_FIELD).cloned().ok_or_else(|| {
        Error::MalformedRecord(format!("{kind} on {namespace} has no {ID_FIELD}"))
    })?;

    Ok(ChangeEvent {
        operation_kind: kind,
        document_id,
        document: Some(source.payload.clone()),
        mutation_payload: source.payload.clone(),
        changed_path: String::new(),
        current_value: None,
        selector: Document::object(),
        event_name: event_name(kind, &source.namespace, ""),
        source_record: source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, MemoryLogger};
    use crate::registry::MemoryDatabase;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from(value)
    }

    fn builder(registry: ConnectionRegistry) -> (EventBuilder, MemoryLogger) {
        let logger = MemoryLogger::new();
        (
            EventBuilder::new(Arc::new(registry), Arc::new(logger.clone())),
            logger,
        )
    }

    fn names(events: &[ChangeEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_name.as_str()).collect()
    }

    #[test]
    fn test_update_paths() {
        assert_eq!(
            update_paths(&doc(json!({"$set": {"a": 1}, "$inc": {"b": 2}}))),
            vec!["a", "b"]
        );
        assert!(update_paths(&doc(json!({"name": "x"}))).is_empty());
        assert!(update_paths(&doc(json!(null))).is_empty());
        // Duplicates across operators are kept; literal keys are ignored.
        assert_eq!(
            update_paths(&doc(json!({"$set": {"a": 1}, "name": {"b": 1}, "$unset": {"a": ""}}))),
            vec!["a", "a"]
        );
        // Scalar operator bodies such as `$v` contribute nothing.
        assert_eq!(update_paths(&doc(json!({"$v": 1, "$set": {"a.b": 1}}))), vec!["a.b"]);
        // Extended JSON values are leaves, not sub-documents.
        assert_eq!(
            update_paths(&doc(json!({"$set": {
                "at": {"$date": "2024-01-01T00:00:00Z"},
                "n": {"$numberLong": "5"}
            }}))),
            vec!["at", "n"]
        );
    }

    #[tokio::test]
    async fn test_insert_event() {
        let (builder, _) = builder(ConnectionRegistry::new());
        let body = doc(json!({"_id": 42, "name": "ada"}));
        let record = RawChangeRecord::insert("shop.users", body.clone());

        let events = builder.build(&record).await.unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.event_name, "insert:shop.users");
        assert_eq!(event.operation_kind, OperationKind::Insert);
        assert_eq!(event.document_id, Document::Int(42));
        assert_eq!(event.document.as_ref(), Some(&body));
        assert_eq!(event.mutation_payload, body);
        assert_eq!(event.changed_path, "");
        assert_eq!(event.selector, Document::object());
        assert!(event.current_value.is_none());
        assert_eq!(*event.source_record, record);
    }

    #[tokio::test]
    async fn test_delete_event() {
        let (builder, _) = builder(ConnectionRegistry::new());
        let record = RawChangeRecord::delete(
            "shop.users",
            doc(json!({"_id": {"$oid": "5f1d7a2b9c8e4a0012345678"}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(names(&events), vec!["delete:shop.users"]);
        assert_eq!(
            events[0].document_id,
            Document::object_id("5f1d7a2b9c8e4a0012345678").unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_without_operators_is_silent() {
        let (builder, _) = builder(ConnectionRegistry::new());
        let record = RawChangeRecord::update("db.coll", doc(json!({"_id": 1})), doc(json!({"name": "x"})));

        assert!(builder.build(&record).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_one_event_per_path() {
        let (builder, _) = builder(ConnectionRegistry::new());
        let record = RawChangeRecord::update(
            "db.coll",
            doc(json!({"_id": 1})),
            doc(json!({"$set": {"a": 1}, "$inc": {"b": 2}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(names(&events), vec!["update:db.coll.a", "update:db.coll.b"]);
        assert_eq!(events[0].changed_path, "a");
        assert_eq!(events[1].changed_path, "b");
        for event in &events {
            assert_eq!(event.document_id, Document::Int(1));
            assert_eq!(event.selector, doc(json!({"_id": 1})));
            assert!(event.document.is_none());
            assert!(event.current_value.is_none());
            assert!(Arc::ptr_eq(&event.source_record, &events[0].source_record));
        }
    }

    #[tokio::test]
    async fn test_update_enriched_from_live_document() {
        let db = Arc::new(MemoryDatabase::new());
        db.insert("users", doc(json!({"_id": 7, "profile": {"city": "Oslo", "zip": "0150"}})));
        let (builder, _) = builder(ConnectionRegistry::new().with_database("app", db.clone()));

        let record = RawChangeRecord::update(
            "app.users",
            doc(json!({"_id": 7})),
            doc(json!({"$set": {"profile": {"city": "Oslo", "zip": "0150"}}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(names(&events), vec!["update:app.users.profile.city", "update:app.users.profile.zip"]);
        assert_eq!(events[0].current_value, Some(Document::from("Oslo")));
        assert_eq!(events[1].current_value, Some(Document::from("0150")));
        assert_eq!(events[0].document, events[1].document);
        assert!(events[0].document.is_some());
        // One lookup per record, not per path.
        assert_eq!(db.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_refetch_failure_still_emits() {
        let db = Arc::new(MemoryDatabase::new());
        db.create_collection("users");
        db.set_fail_lookups(true);
        let (builder, logger) = builder(ConnectionRegistry::new().with_database("app", db));

        let record = RawChangeRecord::update(
            "app.users",
            doc(json!({"_id": 7})),
            doc(json!({"$set": {"name": "ada"}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(names(&events), vec!["update:app.users.name"]);
        assert!(events[0].document.is_none());
        assert!(events[0].current_value.is_none());
        assert_eq!(logger.messages(LogLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_collection_failure_still_emits() {
        let (builder, logger) =
            builder(ConnectionRegistry::new().with_database("app", Arc::new(MemoryDatabase::new())));

        let record = RawChangeRecord::update(
            "app.ghosts",
            doc(json!({"_id": 1})),
            doc(json!({"$set": {"seen": true}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].document.is_none());
        assert!(logger.messages(LogLevel::Error)[0].contains("app.ghosts"));
    }

    #[tokio::test]
    async fn test_unavailable_connection_skips_refetch() {
        let (builder, logger) = builder(ConnectionRegistry::new().with_unavailable("app"));
        let record = RawChangeRecord::update(
            "app.users",
            doc(json!({"_id": 1})),
            doc(json!({"$set": {"name": "ada"}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].document.is_none());
        assert!(logger.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_leaves_event_unenriched() {
        let db = Arc::new(MemoryDatabase::new());
        db.create_collection("users");
        let (builder, logger) = builder(ConnectionRegistry::new().with_database("app", db));

        let record = RawChangeRecord::update(
            "app.users",
            doc(json!({"_id": 99})),
            doc(json!({"$set": {"name": "ada"}})),
        );

        let events = builder.build(&record).await.unwrap();
        assert!(events[0].document.is_none());
        assert_eq!(logger.messages(LogLevel::Debug).len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let (builder, _) = builder(ConnectionRegistry::new());
        let record = RawChangeRecord::from_json(r#"{"op": "n", "ns": "", "o": {"msg": "noop"}}"#).unwrap();

        let err = builder.build(&record).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(code) if code == "n"));
    }

    #[tokio::test]
    async fn test_malformed_records() {
        let (builder, _) = builder(ConnectionRegistry::new());

        let no_id = RawChangeRecord::insert("db.coll", doc(json!({"name": "x"})));
        assert!(matches!(builder.build(&no_id).await, Err(Error::MalformedRecord(_))));

        let bad_ns = RawChangeRecord::insert("nodot", doc(json!({"_id": 1})));
        assert!(matches!(builder.build(&bad_ns).await, Err(Error::MalformedRecord(_))));

        let mut no_selector =
            RawChangeRecord::update("db.coll", doc(json!({"_id": 1})), doc(json!({"$set": {"a": 1}})));
        no_selector.selector = None;
        assert!(matches!(builder.build(&no_selector).await, Err(Error::MalformedRecord(_))));

        let selector_without_id =
            RawChangeRecord::update("db.coll", doc(json!({"x": 1})), doc(json!({"$set": {"a": 1}})));
        assert!(matches!(
            builder.build(&selector_without_id).await,
            Err(Error::MalformedRecord(_))
        ));
    }
}
