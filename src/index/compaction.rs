//! Compaction: repack underfull pages from their successors
//!
//! ```text
//! before  P=3   [g, f]  []  [e]  [d, c, b, a]
//! after         [g, f, e]  [d, c, b]  [a]
//! ```
//!
//! Ids only ever move from a later page to the tail of an earlier one, front
//! element first, so the flattened order is untouched. Emptied pages are
//! deleted. An empty page that still has data after it is refilled rather
//! than deleted, which keeps the surviving pages contiguous from 0.

use super::pages::PageStore;
use crate::error::Result;
use serde::Serialize;
use tracing::debug;

/// Outcome of one compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub pages_scanned: usize,
    pub pages_rewritten: usize,
    pub pages_deleted: usize,
    pub ids_moved: usize,
}

impl CompactionReport {
    /// True when the pass wrote nothing
    pub fn is_noop(&self) -> bool {
        self.pages_rewritten == 0 && self.pages_deleted == 0
    }
}

pub(crate) async fn compact(pages: &PageStore, page_size: usize) -> Result<CompactionReport> {
    let mut report = CompactionReport::default();
    // First index this pass has not deleted. A missing key below it is a hole
    // left by an earlier step, not the end of the collection.
    let mut cursor = 0usize;
    let mut page_no = 0usize;

    loop {
        let (mut page, existed) = match pages.load(page_no).await? {
            Some(page) => (page, true),
            None if page_no < cursor => (Vec::new(), false),
            None => break,
        };
        report.pages_scanned += 1;
        let original_len = page.len();

        let mut source_no = cursor.max(page_no + 1);
        while page.len() < page_size {
            let Some(mut source) = next_source(pages, &mut source_no, &mut report).await? else {
                break;
            };

            let take = (page_size - page.len()).min(source.len());
            page.extend(source.drain(..take));
            report.ids_moved += take;

            if source.is_empty() {
                pages.remove(source_no).await?;
                report.pages_deleted += 1;
                source_no += 1;
            } else {
                pages.save(source_no, &source).await?;
                report.pages_rewritten += 1;
            }
        }
        cursor = source_no;

        if page.is_empty() {
            // Nothing follows: this was the tail
            if existed {
                pages.remove(page_no).await?;
                report.pages_deleted += 1;
            }
            break;
        }

        if !existed || page.len() != original_len {
            pages.save(page_no, &page).await?;
            report.pages_rewritten += 1;
        }

        debug!(page = page_no, len = page.len(), "Page compacted");
        page_no += 1;
    }

    Ok(report)
}

/// First non-empty page at or after `source_no`, deleting empty ones passed
async fn next_source(
    pages: &PageStore,
    source_no: &mut usize,
    report: &mut CompactionReport,
) -> Result<Option<Vec<super::ItemId>>> {
    loop {
        match pages.load(*source_no).await? {
            None => return Ok(None),
            Some(page) if page.is_empty() => {
                pages.remove(*source_no).await?;
                report.pages_deleted += 1;
                *source_no += 1;
            }
            Some(page) => return Ok(Some(page)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ItemId;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn ids(names: &[&str]) -> Vec<ItemId> {
        names.iter().map(|n| ItemId::from(*n)).collect()
    }

    async fn seed(layout: &[&[&str]]) -> Result<(MemoryStorage, PageStore)> {
        let backend = MemoryStorage::new();
        let pages = PageStore::new(Storage::new(Arc::new(backend.clone())), "INDEX");
        for (n, page) in layout.iter().enumerate() {
            pages.save(n, &ids(page)).await?;
        }
        Ok((backend, pages))
    }

    #[tokio::test]
    async fn test_repacks_across_empty_pages() -> Result<()> {
        let (_, pages) = seed(&[&["g", "f"], &[], &["e"], &["d", "c", "b", "a"]]).await?;

        let report = compact(&pages, 3).await?;

        assert_eq!(
            pages.scan().await?,
            vec![ids(&["g", "f", "e"]), ids(&["d", "c", "b"]), ids(&["a"])]
        );
        assert_eq!(report.ids_moved, 5);
        assert!(pages.load(3).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_hole_left_by_deleted_empty_page_is_refilled() -> Result<()> {
        // page 1 is empty and deleted while filling page 0, page 2 keeps data
        let (_, pages) = seed(&[&["a"], &[], &["b", "c", "d", "e"]]).await?;

        compact(&pages, 3).await?;

        assert_eq!(
            pages.scan().await?,
            vec![ids(&["a", "b", "c"]), ids(&["d", "e"])]
        );
        assert!(pages.load(2).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_first_page_is_refilled() -> Result<()> {
        let (_, pages) = seed(&[&[], &["a"]]).await?;

        compact(&pages, 3).await?;

        assert_eq!(pages.scan().await?, vec![ids(&["a"])]);
        assert!(pages.load(1).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_all_empty_pages_are_deleted() -> Result<()> {
        let (backend, pages) = seed(&[&[], &[], &[]]).await?;

        let report = compact(&pages, 3).await?;

        assert!(backend.is_empty());
        assert_eq!(report.pages_deleted, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() -> Result<()> {
        let (backend, pages) = seed(&[&["a"], &["b", "c"], &[], &["d", "e", "f", "g"]]).await?;

        compact(&pages, 3).await?;
        let writes = backend.write_count();

        let report = compact(&pages, 3).await?;
        assert!(report.is_noop());
        assert_eq!(backend.write_count(), writes);
        Ok(())
    }
}
