//! Metadata record: aggregate count and page capacity

use crate::error::{Error, Result};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Stored under `<prefix>:meta`
///
/// `count` is maintained next to the pages, never derived from them, so the
/// two can drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    pub count: u64,
    pub page_size: usize,
}

impl IndexMeta {
    pub fn new(page_size: usize) -> Self {
        Self { count: 0, page_size }
    }
}

/// Reads and writes the metadata record
pub struct MetaStore {
    storage: Storage,
    key: String,
    /// Capacity written when no record exists yet
    default_page_size: usize,
    mismatch_reported: AtomicBool,
}

impl MetaStore {
    pub fn new(storage: Storage, prefix: &str, default_page_size: usize) -> Self {
        Self {
            storage,
            key: format!("{}:meta", prefix),
            default_page_size,
            mismatch_reported: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Existing record, or a freshly persisted default one
    ///
    /// The stored capacity always wins over the configured one.
    pub async fn read_or_init(&self) -> Result<IndexMeta> {
        match self.storage.get_json::<IndexMeta>(&self.key).await? {
            Some(meta) => {
                if meta.page_size == 0 {
                    return Err(Error::Corrupted(format!("{}: pageSize is 0", self.key)));
                }
                if meta.page_size != self.default_page_size
                    && !self.mismatch_reported.swap(true, Ordering::Relaxed)
                {
                    warn!(
                        stored = meta.page_size,
                        configured = self.default_page_size,
                        "Configured page size ignored, capacity is fixed at creation"
                    );
                }
                Ok(meta)
            }
            None => {
                let meta = IndexMeta::new(self.default_page_size);
                self.persist(&meta).await?;
                info!(key = %self.key, page_size = meta.page_size, "Created index metadata");
                Ok(meta)
            }
        }
    }

    /// Unconditional overwrite
    pub async fn persist(&self, meta: &IndexMeta) -> Result<()> {
        self.storage.put_json(&self.key, meta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_or_init_creates_default() -> Result<()> {
        let backend = MemoryStorage::new();
        let store = MetaStore::new(Storage::new(Arc::new(backend.clone())), "INDEX", 200);

        let meta = store.read_or_init().await?;
        assert_eq!(meta, IndexMeta { count: 0, page_size: 200 });
        assert_eq!(
            backend.get_value("INDEX:meta"),
            Some(json!({"count": 0, "pageSize": 200}))
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_stored_page_size_wins() -> Result<()> {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        storage.put("INDEX:meta", json!({"count": 7, "pageSize": 3})).await?;

        let store = MetaStore::new(storage, "INDEX", 200);
        let meta = store.read_or_init().await?;
        assert_eq!(meta.page_size, 3);
        assert_eq!(meta.count, 7);

        Ok(())
    }

    #[tokio::test]
    async fn test_zero_page_size_is_corrupted() -> Result<()> {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        storage.put("INDEX:meta", json!({"count": 0, "pageSize": 0})).await?;

        let store = MetaStore::new(storage, "INDEX", 200);
        assert!(matches!(store.read_or_init().await, Err(Error::Corrupted(_))));

        Ok(())
    }
}
