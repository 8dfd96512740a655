//! Connection registry for document re-fetches.
//!
//! Update records only carry the operator payload, so the builder re-reads
//! the updated document through a per-database handle when one is available.
//! Establishing those connections is the caller's job; this module only
//! defines the handle traits, the registry that maps database names to them,
//! and an in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as Json;

use opwatch_proto::{Document, ID_FIELD};

use crate::error::{Error, Result};

/// A queryable collection.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Find the document whose `_id` equals `id`.
    async fn find_one(&self, id: &Document) -> Result<Option<Document>>;
}

/// A live connection to one database.
pub trait DatabaseHandle: Send + Sync {
    /// Get a handle to a collection of this database.
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>>;
}

/// A registry entry.
#[derive(Clone)]
pub enum Connection {
    /// A usable database handle.
    Available(Arc<dyn DatabaseHandle>),
    /// The database is known but could not be connected to.
    Unavailable,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Available(_) => f.write_str("Available"),
            Connection::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Read-only mapping from database name to connection.
#[derive(Clone, Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database handle.
    pub fn with_database(mut self, name: impl Into<String>, handle: Arc<dyn DatabaseHandle>) -> Self {
        self.connections.insert(name.into(), Connection::Available(handle));
        self
    }

    /// Record that a database exists but has no usable connection.
    pub fn with_unavailable(mut self, name: impl Into<String>) -> Self {
        self.connections.insert(name.into(), Connection::Unavailable);
        self
    }

    /// Get the handle for a database.
    ///
    /// Missing entries and entries marked unavailable both return `None`.
    pub fn get(&self, database: &str) -> Option<&Arc<dyn DatabaseHandle>> {
        match self.connections.get(database) {
            Some(Connection::Available(handle)) => Some(handle),
            Some(Connection::Unavailable) | None => None,
        }
    }

    /// Check whether a database has an entry, usable or not.
    pub fn contains(&self, database: &str) -> bool {
        self.connections.contains_key(database)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Build a registry of in-memory databases from a fixture.
    ///
    /// The fixture has the shape `{"<db>": {"<collection>": [documents]}}`;
    /// a database mapped to `null` is registered as unavailable.
    pub fn from_fixture(fixture: &Json) -> Result<Self> {
        let databases = fixture
            .as_object()
            .ok_or_else(|| Error::Config("fixture must be an object of databases".to_string()))?;

        let mut registry = Self::new();
        for (name, collections) in databases {
            if collections.is_null() {
                registry = registry.with_unavailable(name.as_str());
                continue;
            }
            let database = MemoryDatabase::from_fixture(collections)?;
            registry = registry.with_database(name.as_str(), Arc::new(database));
        }
        Ok(registry)
    }
}

type SharedDocuments = Arc<RwLock<Vec<Document>>>;

/// In-memory database.
///
/// Unlike a real server, asking for a collection that was never created is
/// an error, which makes handle-acquisition failures easy to exercise.
#[derive(Default)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, SharedDocuments>>,
    fail_lookups: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `{"<collection>": [documents]}`.
    pub fn from_fixture(fixture: &Json) -> Result<Self> {
        let collections = fixture
            .as_object()
            .ok_or_else(|| Error::Config("database fixture must be an object of collections".to_string()))?;

        let database = Self::new();
        for (name, documents) in collections {
            let documents = documents.as_array().ok_or_else(|| {
                Error::Config(format!("collection {name:?} must be an array of documents"))
            })?;
            database.create_collection(name.as_str());
            for document in documents {
                database.insert(name.as_str(), Document::from(document.clone()));
            }
        }
        Ok(database)
    }

    /// Create a collection if it does not exist.
    pub fn create_collection(&self, name: &str) {
        self.collections.write().entry(name.to_string()).or_default();
    }

    /// Insert or replace a document (matched on `_id`), creating the collection.
    pub fn insert(&self, collection: &str, document: Document) {
        let documents = self
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .clone();
        let mut documents = documents.write();
        let id = document.get(ID_FIELD).cloned();
        match documents
            .iter_mut()
            .find(|existing| id.is_some() && existing.get(ID_FIELD) == id.as_ref())
        {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }

    /// Make every subsequent lookup fail (or succeed again).
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of `find_one` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl DatabaseHandle for MemoryDatabase {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>> {
        let documents = self
            .collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CollectionUnavailable(name.to_string()))?;

        Ok(Arc::new(MemoryCollection {
            name: name.to_string(),
            documents,
            fail_lookups: Arc::clone(&self.fail_lookups),
            lookups: Arc::clone(&self.lookups),
        }))
    }
}

/// Collection handle served by [`MemoryDatabase`].
struct MemoryCollection {
    name: String,
    documents: SharedDocuments,
    fail_lookups: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    async fn find_one(&self, id: &Document) -> Result<Option<Document>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::Lookup(format!("{}: lookups disabled", self.name)));
        }

        let documents = self.documents.read();
        Ok(documents
            .iter()
            .find(|doc| doc.get(ID_FIELD) == Some(id))
            .cloned())
    }
}
