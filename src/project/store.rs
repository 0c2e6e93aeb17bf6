// Persistence backend interface
//
// Records are JSON values filed under a collection name and a key. The
// composition never talks to a backend directly; a `Store` is handed to the
// project manager for the duration of a save or load.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Identity of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Fresh random identity
    pub fn generate() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Store {
    /// File a record under a new identity
    fn insert(&mut self, collection: &str, record: Value) -> Result<RecordId, StoreError>;

    /// File a record under a caller-chosen identity, replacing any previous one
    fn insert_with_id(
        &mut self,
        collection: &str,
        id: &RecordId,
        record: Value,
    ) -> Result<(), StoreError>;

    fn fetch(&self, collection: &str, id: &RecordId) -> Result<Option<Value>, StoreError>;
}

/// In-process store, optionally written to / read from a JSON file
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    collections: BTreeMap<String, BTreeMap<RecordId, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.values().all(BTreeMap::is_empty)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Store for MemoryStore {
    fn insert(&mut self, collection: &str, record: Value) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.insert_with_id(collection, &id, record)?;
        Ok(id)
    }

    fn insert_with_id(
        &mut self,
        collection: &str,
        id: &RecordId,
        record: Value,
    ) -> Result<(), StoreError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), record);
        Ok(())
    }

    fn fetch(&self, collection: &str, id: &RecordId) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }
}
