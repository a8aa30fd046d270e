//! JSONL-based durable storage with in-memory caching.
//!
//! Each collection lives in `<base>/<collection>.jsonl`, one JSON record per line.
//! Lines that fail to parse are skipped with a warning so one corrupt write does
//! not take the whole collection down.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{Result, ReviewqError};

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the collection files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let records = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut records = Vec::new();
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => log::warn!(
                        "Skipping malformed line {} in {}: {}",
                        lineno + 1,
                        path.display(),
                        e
                    ),
                }
            }
            records
        } else {
            Vec::new()
        };

        cache.insert(collection.to_string(), records);
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Rewrite the entire collection file from cache.
    fn rewrite_file(&self, collection: &str) -> Result<()> {
        let cache = self.cache.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| ReviewqError::Storage(format!("Collection not loaded: {}", collection)))?;

        let path = self.collection_path(collection);
        let mut file = File::create(&path)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        Ok(())
    }
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        // Append to file first (source of truth)
        self.append_to_file(collection, &value)?;

        let mut cache = self.cache.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        cache.entry(collection.to_string()).or_default().push(value);

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| ReviewqError::Storage(format!("Collection not loaded: {}", collection)))?;

        // Latest write wins when an append left duplicates behind
        match records.iter().rev().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        {
            let mut cache = self.cache.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
            let records = cache
                .get_mut(collection)
                .ok_or_else(|| ReviewqError::Storage(format!("Collection not loaded: {}", collection)))?;

            let before = records.len();
            records.retain(|r| record_id(r) != Some(id));
            if records.len() == before {
                return Err(ReviewqError::RecordNotFound(id.to_string()));
            }
            records.push(value);
        }

        self.rewrite_file(collection)?;

        Ok(())
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| ReviewqError::Storage(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if !filters.iter().all(|f| f.matches(record)) {
                continue;
            }
            match serde_json::from_value::<T>(record.clone()) {
                Ok(parsed) => results.push(parsed),
                Err(e) => log::warn!("Skipping record in '{}' with unexpected shape: {}", collection, e),
            }
        }

        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }

    fn clear(&self, collection: &str) -> Result<()> {
        {
            let mut cache = self.cache.write().map_err(|e| ReviewqError::Storage(e.to_string()))?;
            cache.insert(collection.to_string(), Vec::new());
        }
        self.rewrite_file(collection)
    }
}
