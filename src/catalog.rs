//! Item records and the flows built on the index
//!
//! Each item owns a record at `<record_prefix>:<id>` pointing at its payload
//! in an external store. The payload itself never passes through here.

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::index::{CompactionReport, ItemId, LogicalPage, PagedIndex};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Stored per item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Locator understood by the external payload store
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Ids whose record existed and was deleted
    pub deleted: Vec<ItemId>,
    /// Ids without a record
    pub missing: Vec<ItemId>,
    /// Ids actually found in index pages
    pub removed_from_index: usize,
    pub compaction: CompactionReport,
}

/// Item records plus the shared index
pub struct Catalog {
    storage: Storage,
    index: Arc<PagedIndex>,
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(storage: Storage, index: Arc<PagedIndex>, config: CatalogConfig) -> Result<Self> {
        if config.record_prefix.is_empty() {
            return Err(Error::InvalidArgument("record prefix must not be empty".to_string()));
        }
        if config.logical_page_size == 0 {
            return Err(Error::InvalidArgument(
                "logical page size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            storage,
            index,
            config,
        })
    }

    pub fn index(&self) -> &PagedIndex {
        &self.index
    }

    fn record_key(&self, id: &ItemId) -> String {
        format!("{}:{}", self.config.record_prefix, id)
    }

    /// Store a record for a new item and put it at the head of the index
    #[instrument(skip(self))]
    pub async fn register(&self, reference: &str) -> Result<ItemId> {
        if reference.is_empty() {
            return Err(Error::InvalidArgument("reference must not be empty".to_string()));
        }

        let id = ItemId::generate();
        let record = ItemRecord {
            reference: reference.to_string(),
            created_at: Utc::now(),
        };

        self.storage.put_json(&self.record_key(&id), &record).await?;
        self.index.add(id.clone()).await?;

        info!(id = %id, "Registered item");
        Ok(id)
    }

    pub async fn lookup(&self, id: &ItemId) -> Result<Option<ItemRecord>> {
        self.storage.get_json(&self.record_key(id)).await
    }

    /// Like [`lookup`](Self::lookup) but absence is an error
    pub async fn require(&self, id: &ItemId) -> Result<ItemRecord> {
        self.lookup(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {}", id)))
    }

    /// Delete records, drop the ids from the index, then compact
    ///
    /// Every requested id is removed from the index, including ids whose
    /// record was already gone. Repeated ids count once.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn delete(&self, ids: &[ItemId]) -> Result<DeleteReport> {
        let mut seen = HashSet::new();
        let ids: Vec<ItemId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();

        let mut report = DeleteReport::default();

        for id in &ids {
            let key = self.record_key(id);
            if self.storage.get(&key).await?.is_none() {
                warn!(id = %id, "No record for item");
                report.missing.push(id.clone());
                continue;
            }
            self.storage.delete(&key).await?;
            report.deleted.push(id.clone());
        }

        report.removed_from_index = self.index.remove(&ids).await?;
        report.compaction = self.index.compact().await?;

        info!(
            deleted = report.deleted.len(),
            missing = report.missing.len(),
            removed_from_index = report.removed_from_index,
            "Deleted items"
        );
        Ok(report)
    }

    /// Presentation page `page_number`; numbers below 1 read as 1
    pub async fn browse(&self, page_number: usize) -> Result<LogicalPage> {
        self.index
            .logical_page(page_number.max(1), self.config.logical_page_size)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::storage::MemoryStorage;

    fn catalog(page_size: usize, logical_page_size: usize) -> Result<(MemoryStorage, Catalog)> {
        let backend = MemoryStorage::new();
        let storage = Storage::new(Arc::new(backend.clone()));
        let index = PagedIndex::open(
            storage.clone(),
            &IndexConfig {
                page_size,
                ..IndexConfig::default()
            },
        )?;
        let catalog = Catalog::new(
            storage,
            Arc::new(index),
            CatalogConfig {
                logical_page_size,
                ..CatalogConfig::default()
            },
        )?;
        Ok((backend, catalog))
    }

    #[tokio::test]
    async fn test_register_and_lookup() -> Result<()> {
        let (backend, catalog) = catalog(3, 2)?;

        let id = catalog.register("photos/cat.jpg").await?;
        let record = catalog.require(&id).await?;
        assert_eq!(record.reference, "photos/cat.jpg");
        assert!(backend.contains(&format!("img:{}", id)));

        assert_eq!(catalog.index().ids().await?, vec![id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_reference_rejected() -> Result<()> {
        let (_, catalog) = catalog(3, 2)?;
        assert!(matches!(
            catalog.register("").await,
            Err(Error::InvalidArgument(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_unknown_is_none() -> Result<()> {
        let (_, catalog) = catalog(3, 2)?;
        let id = ItemId::from("missing");
        assert!(catalog.lookup(&id).await?.is_none());
        assert!(matches!(catalog.require(&id).await, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_compacts_and_reports_missing() -> Result<()> {
        let (_, catalog) = catalog(2, 2)?;

        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(catalog.register(&format!("file/{}", n)).await?);
        }
        // timeline newest first: 4 3 | 2 1 | 0

        let ghost = ItemId::from("ghost");
        let report = catalog
            .delete(&[ids[4].clone(), ids[1].clone(), ghost.clone()])
            .await?;

        assert_eq!(report.deleted, vec![ids[4].clone(), ids[1].clone()]);
        assert_eq!(report.missing, vec![ghost]);
        assert_eq!(report.removed_from_index, 2);

        assert_eq!(
            catalog.index().pages().await?,
            vec![
                vec![ids[3].clone(), ids[2].clone()],
                vec![ids[0].clone()]
            ]
        );
        assert!(catalog.lookup(&ids[4]).await?.is_none());

        // ghost id also decremented the count
        assert_eq!(catalog.index().meta().await?.count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_repeated_id_reported_once() -> Result<()> {
        let (_, catalog) = catalog(3, 2)?;
        let keep = catalog.register("file/keep").await?;
        let id = catalog.register("file/twice").await?;

        let report = catalog.delete(&[id.clone(), id.clone()]).await?;

        assert_eq!(report.deleted, vec![id]);
        assert!(report.missing.is_empty());
        assert_eq!(report.removed_from_index, 1);
        assert_eq!(catalog.index().ids().await?, vec![keep]);
        assert_eq!(catalog.index().meta().await?.count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_browse_clamps_page_number() -> Result<()> {
        let (_, catalog) = catalog(3, 2)?;
        for n in 0..3 {
            catalog.register(&format!("file/{}", n)).await?;
        }

        let first = catalog.browse(0).await?;
        assert_eq!(first.number, 1);
        assert_eq!(first.ids.len(), 2);
        assert_eq!(first.total_pages, 2);

        let second = catalog.browse(2).await?;
        assert_eq!(second.ids.len(), 1);
        Ok(())
    }
}
