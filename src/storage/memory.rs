//! Session-tier storage: same contract as the JSONL store, nothing touches disk.
//!
//! Everything held here is gone when the process exits, which is the lifetime
//! the priority cache snapshot is meant to have.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{Result, ReviewqError};

/// In-memory storage keyed by collection name.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw JSON value without shape checks. Used to simulate foreign writers.
    pub fn insert_raw(&self, collection: &str, value: serde_json::Value) -> Result<()> {
        let mut collections = self.collections.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        collections.entry(collection.to_string()).or_default().push(value);
        Ok(())
    }
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl Storage for MemoryStorage {
    fn create<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let mut collections = self.collections.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        collections.entry(collection.to_string()).or_default().push(value);
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let collections = self.collections.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let found = collections
            .get(collection)
            .and_then(|records| records.iter().rev().find(|r| record_id(r) == Some(id)));
        match found {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let mut collections = self.collections.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| ReviewqError::RecordNotFound(id.to_string()))?;

        match records.iter_mut().find(|r| record_id(r) == Some(id)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ReviewqError::RecordNotFound(id.to_string())),
        }
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        let collections = self.collections.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        for record in records.iter().filter(|r| filters.iter().all(|f| f.matches(r))) {
            results.push(serde_json::from_value(record.clone())?);
        }
        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }

    fn clear(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        collections.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Blob {
        id: String,
        count: u32,
    }

    impl HasId for Blob {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_create_get_update() {
        let storage = MemoryStorage::new();
        let blob = Blob {
            id: "snapshot".to_string(),
            count: 1,
        };

        storage.create("cache", &blob).unwrap();
        assert_eq!(storage.get::<Blob>("cache", "snapshot").unwrap(), Some(blob.clone()));

        let bumped = Blob { count: 2, ..blob };
        storage.update("cache", "snapshot", &bumped).unwrap();
        assert_eq!(storage.get::<Blob>("cache", "snapshot").unwrap().unwrap().count, 2);

    }

    #[test]
    fn test_upsert_on_empty_collection() {
        let storage = MemoryStorage::new();
        let blob = Blob {
            id: "a".to_string(),
            count: 3,
        };
        storage.upsert("cache", &blob).unwrap();
        storage.upsert("cache", &Blob { count: 4, ..blob }).unwrap();

        let all: Vec<Blob> = storage.list("cache").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].count, 4);
    }

    #[test]
    fn test_get_with_wrong_shape_is_an_error() {
        let storage = MemoryStorage::new();
        storage
            .insert_raw("cache", serde_json::json!({"id": "snapshot", "count": "many"}))
            .unwrap();

        let result = storage.get::<Blob>("cache", "snapshot");
        assert!(matches!(result, Err(ReviewqError::Json(_))));
    }

    #[test]
    fn test_clear_and_missing_collection() {
        let storage = MemoryStorage::new();
        storage
            .create(
                "cache",
                &Blob {
                    id: "a".to_string(),
                    count: 1,
                },
            )
            .unwrap();
        storage.clear("cache").unwrap();

        let all: Vec<Blob> = storage.list("cache").unwrap();
        assert!(all.is_empty());
        assert!(storage.get::<Blob>("cache", "a").unwrap().is_none());
    }
}
