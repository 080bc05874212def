//! Storage engine trait

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Key-value storage engine
///
/// Every call is individually atomic. Nothing groups calls together: there
/// are no transactions and no compare-and-swap.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Unconditional overwrite
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Removing an absent key succeeds
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Shared storage handle
#[derive(Clone)]
pub struct Storage {
    engine: Arc<dyn StorageEngine>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish()
    }
}

impl Storage {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.engine.get(key).await
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.engine.put(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.engine.delete(key).await
    }

    /// Fetch and decode a typed record
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.engine.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Corrupted(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Encode and store a typed record
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.engine.put(key, value).await
    }
}
