//! In-memory storage
//!
//! Backs tests and dry runs. Nothing survives the process.

use crate::error::Result;
use crate::storage::engine::StorageEngine;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory key-value storage
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Value>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryStorage {
    /// Create an empty storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Whether `key` currently holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Synchronous read for inspection
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Sorted snapshot of all keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Successful puts and deletes since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Drop all data
    pub fn clear(&self) {
        self.data.lock().clear();
    }
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.data.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
