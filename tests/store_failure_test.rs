//! Store failures surface unchanged and nothing is rolled back

use async_trait::async_trait;
use pageindex::config::IndexConfig;
use pageindex::error::{Error, Result};
use pageindex::index::{ItemId, PagedIndex};
use pageindex::storage::{MemoryStorage, Storage, StorageEngine};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fails every write once its budget is spent
struct FlakyStorage {
    inner: MemoryStorage,
    writes_left: AtomicUsize,
}

impl FlakyStorage {
    fn new(inner: MemoryStorage, budget: usize) -> Self {
        Self {
            inner,
            writes_left: AtomicUsize::new(budget),
        }
    }

    fn spend(&self) -> Result<()> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| Error::Storage("store unavailable".to_string()))
    }

    fn refill(&self, budget: usize) {
        self.writes_left.store(budget, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageEngine for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.spend()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.spend()?;
        self.inner.delete(key).await
    }
}

fn config() -> IndexConfig {
    IndexConfig {
        page_size: 2,
        ..IndexConfig::default()
    }
}

#[tokio::test]
async fn test_failure_mid_cascade_propagates_without_rollback() -> Result<()> {
    let backend = MemoryStorage::new();
    let flaky = Arc::new(FlakyStorage::new(backend.clone(), usize::MAX));
    let index = PagedIndex::open(Storage::new(flaky.clone()), &config())?;

    for name in ["a", "b", "c", "d"] {
        index.add(ItemId::from(name)).await?;
    }
    // [d, c] [b, a]

    // meta exists, so the next insert writes page 0, page 1, page 2, meta.
    // Allow only page 0.
    flaky.refill(1);
    let result = index.add(ItemId::from("e")).await;
    assert!(matches!(result, Err(Error::Storage(_))));

    // "c" was carried out of page 0 but never landed on page 1
    let pages = index.pages().await?;
    assert_eq!(pages[0], vec![ItemId::from("e"), ItemId::from("d")]);
    assert_eq!(pages[1], vec![ItemId::from("b"), ItemId::from("a")]);
    assert_eq!(index.meta().await?.count, 4);

    Ok(())
}

#[tokio::test]
async fn test_failure_during_remove_leaves_count_untouched() -> Result<()> {
    let backend = MemoryStorage::new();
    let flaky = Arc::new(FlakyStorage::new(backend.clone(), usize::MAX));
    let index = PagedIndex::open(Storage::new(flaky.clone()), &config())?;

    for name in ["a", "b", "c", "d"] {
        index.add(ItemId::from(name)).await?;
    }

    // First page rewrite succeeds, second fails before meta is written
    flaky.refill(1);
    let result = index.remove(&[ItemId::from("d"), ItemId::from("a")]).await;
    assert!(matches!(result, Err(Error::Storage(_))));

    assert_eq!(index.ids().await?, vec![
        ItemId::from("c"),
        ItemId::from("b"),
        ItemId::from("a"),
    ]);
    assert_eq!(index.meta().await?.count, 4);

    Ok(())
}

#[tokio::test]
async fn test_failure_during_compaction_propagates() -> Result<()> {
    let backend = MemoryStorage::new();
    let flaky = Arc::new(FlakyStorage::new(backend.clone(), usize::MAX));
    let index = PagedIndex::open(Storage::new(flaky.clone()), &config())?;

    for name in ["a", "b", "c", "d", "e"] {
        index.add(ItemId::from(name)).await?;
    }
    index.remove(&[ItemId::from("e")]).await?;

    flaky.refill(0);
    assert!(matches!(index.compact().await, Err(Error::Storage(_))));

    // nothing was written, so the flattened timeline is intact
    flaky.refill(usize::MAX);
    assert_eq!(index.ids().await?.len(), 4);
    index.compact().await?;
    assert_eq!(index.pages().await?.len(), 2);

    Ok(())
}
