//! Paginated item index
//!
//! # Architecture
//!
//! An ordered, newest-first timeline of item ids, cut into fixed-capacity
//! pages that live in a key-value store:
//!
//! ```text
//! INDEX:meta    → {count, pageSize}
//! INDEX:page:0  → [newest ... ]        ≤ pageSize ids
//! INDEX:page:1  → [ ... ]              ≤ pageSize ids
//! ...
//! INDEX:page:n  → [ ... oldest]        first missing index ends the scan
//! ```
//!
//! - **Insertion** prepends to page 0 and carries the displaced oldest id
//!   into the next page until one absorbs it (carry propagation in base
//!   `pageSize`).
//! - **Deletion** filters ids out in place; pages are left underfull.
//! - **Compaction** repacks so every page but the last is full again.
//! - **Reading** maps a presentation window onto physical pages.
//!
//! All access goes through [`PagedIndex`]. Multi-step operations are plain
//! sequences of store calls: callers must keep to a single writer.

pub mod compaction;
pub mod meta;
pub mod pages;
pub mod reader;

pub use compaction::CompactionReport;
pub use meta::{IndexMeta, MetaStore};
pub use pages::PageStore;
pub use reader::LogicalPage;

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Opaque item identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only health snapshot
///
/// Reports drift between the stored count and page contents; nothing here
/// repairs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub count: u64,
    pub page_size: usize,
    pub pages: usize,
    pub stored_ids: usize,
    /// Non-terminal pages holding fewer than `page_size` ids
    pub underfull_pages: usize,
    pub empty_pages: usize,
    /// `count - stored_ids`
    pub drift: i64,
}

/// The index boundary: metadata and page access go through here only
pub struct PagedIndex {
    meta: MetaStore,
    pages: PageStore,
}

impl std::fmt::Debug for PagedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedIndex")
            .field("meta_key", &self.meta.key())
            .finish()
    }
}

impl PagedIndex {
    /// Bind an index to `storage`
    ///
    /// `config.page_size` only matters if the metadata record does not exist
    /// yet.
    pub fn open(storage: Storage, config: &IndexConfig) -> Result<Self> {
        if config.page_size == 0 {
            return Err(Error::InvalidArgument("page size must be greater than 0".to_string()));
        }
        if config.key_prefix.is_empty() {
            return Err(Error::InvalidArgument("key prefix must not be empty".to_string()));
        }

        Ok(Self {
            meta: MetaStore::new(storage.clone(), &config.key_prefix, config.page_size),
            pages: PageStore::new(storage, &config.key_prefix),
        })
    }

    /// Current metadata, created with defaults on first use
    pub async fn meta(&self) -> Result<IndexMeta> {
        self.meta.read_or_init().await
    }

    /// Insert `id` at the head of the timeline
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn add(&self, id: ItemId) -> Result<()> {
        let result = self.add_inner(id).await;
        metrics::record_operation("add", &result);
        result
    }

    async fn add_inner(&self, id: ItemId) -> Result<()> {
        let mut meta = self.meta.read_or_init().await?;

        let depth = self.cascade(id, meta.page_size).await?;
        metrics::CASCADE_DEPTH.observe(depth as f64);

        meta.count += 1;
        self.meta.persist(&meta).await?;

        debug!(depth, count = meta.count, "Inserted id");
        Ok(())
    }

    /// Prepend `id` to page 0, carrying overflow toward higher pages
    ///
    /// Returns the number of pages written. A missing page always absorbs the
    /// carry, so the loop ends at the first page that was not full.
    async fn cascade(&self, id: ItemId, page_size: usize) -> Result<usize> {
        let mut carry = id;
        let mut page_no = 0usize;

        loop {
            let mut page = self.pages.load_or_empty(page_no).await?;
            page.insert(0, carry);

            let overflow = if page.len() > page_size { page.pop() } else { None };
            self.pages.save(page_no, &page).await?;

            match overflow {
                Some(next) => {
                    carry = next;
                    page_no += 1;
                }
                None => return Ok(page_no + 1),
            }
        }
    }

    /// Remove every occurrence of `ids` from all pages
    ///
    /// Pages keep their order and are never deleted here, even when emptied.
    /// `count` drops by the number of distinct ids requested, found or not.
    /// Returns how many ids were actually removed from pages.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn remove(&self, ids: &[ItemId]) -> Result<usize> {
        let result = self.remove_inner(ids).await;
        metrics::record_operation("remove", &result);
        result
    }

    async fn remove_inner(&self, ids: &[ItemId]) -> Result<usize> {
        let targets: HashSet<&ItemId> = ids.iter().collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let mut meta = self.meta.read_or_init().await?;

        let mut removed = 0usize;
        let mut page_no = 0usize;
        while let Some(page) = self.pages.load(page_no).await? {
            let before = page.len();
            let kept: Vec<ItemId> = page.into_iter().filter(|id| !targets.contains(id)).collect();

            if kept.len() != before {
                removed += before - kept.len();
                self.pages.save(page_no, &kept).await?;
            }
            page_no += 1;
        }

        meta.count = meta.count.saturating_sub(targets.len() as u64);
        self.meta.persist(&meta).await?;

        info!(removed, pages = page_no, count = meta.count, "Removed ids");
        Ok(removed)
    }

    /// Repack pages so all but the last are full
    ///
    /// Leaves `count` alone.
    #[instrument(skip(self))]
    pub async fn compact(&self) -> Result<CompactionReport> {
        let result = self.compact_inner().await;
        metrics::record_operation("compact", &result);
        result
    }

    async fn compact_inner(&self) -> Result<CompactionReport> {
        let meta = self.meta.read_or_init().await?;
        let report = compaction::compact(&self.pages, meta.page_size).await?;

        metrics::COMPACTION_MOVED_IDS.inc_by(report.ids_moved as u64);
        metrics::PAGES_DELETED.inc_by(report.pages_deleted as u64);

        info!(
            scanned = report.pages_scanned,
            rewritten = report.pages_rewritten,
            deleted = report.pages_deleted,
            moved = report.ids_moved,
            "Compaction complete"
        );
        Ok(report)
    }

    /// Ids of the 1-based logical page `page_number` of `logical_size` ids
    #[instrument(skip(self))]
    pub async fn fetch_logical_page(
        &self,
        page_number: usize,
        logical_size: usize,
    ) -> Result<Vec<ItemId>> {
        let meta = self.meta.read_or_init().await?;
        let result =
            reader::read_window(&self.pages, meta.page_size, page_number, logical_size).await;
        metrics::record_operation("fetch", &result);
        result
    }

    /// Logical page together with paging context from the stored count
    pub async fn logical_page(&self, page_number: usize, logical_size: usize) -> Result<LogicalPage> {
        let meta = self.meta.read_or_init().await?;
        let ids = reader::read_window(&self.pages, meta.page_size, page_number, logical_size).await?;

        Ok(LogicalPage {
            number: page_number,
            size: logical_size,
            total_pages: reader::total_pages(meta.count, logical_size),
            ids,
        })
    }

    /// Contents of the contiguous page prefix
    pub async fn pages(&self) -> Result<Vec<Vec<ItemId>>> {
        self.pages.scan().await
    }

    /// Flattened timeline, newest first
    pub async fn ids(&self) -> Result<Vec<ItemId>> {
        Ok(self.pages.scan().await?.into_iter().flatten().collect())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let meta = self.meta.read_or_init().await?;
        let pages = self.pages.scan().await?;

        let stored_ids: usize = pages.iter().map(Vec::len).sum();
        let last = pages.len().saturating_sub(1);
        let underfull_pages = pages
            .iter()
            .enumerate()
            .filter(|(n, page)| *n < last && page.len() < meta.page_size)
            .count();
        let empty_pages = pages.iter().filter(|page| page.is_empty()).count();

        Ok(IndexStats {
            count: meta.count,
            page_size: meta.page_size,
            pages: pages.len(),
            stored_ids,
            underfull_pages,
            empty_pages,
            drift: meta.count as i64 - stored_ids as i64,
        })
    }
}
