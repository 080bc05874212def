//! Physical pages: `<prefix>:page:<n>` → ordered ids, newest first

use super::ItemId;
use crate::error::Result;
use crate::storage::Storage;
use tracing::debug;

/// Key-value mapping from page index to page content
pub struct PageStore {
    storage: Storage,
    prefix: String,
}

impl PageStore {
    pub fn new(storage: Storage, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
        }
    }

    pub fn page_key(&self, page_no: usize) -> String {
        format!("{}:page:{}", self.prefix, page_no)
    }

    /// `None` marks the end of the collection for sequential scans
    pub async fn load(&self, page_no: usize) -> Result<Option<Vec<ItemId>>> {
        self.storage.get_json(&self.page_key(page_no)).await
    }

    pub async fn load_or_empty(&self, page_no: usize) -> Result<Vec<ItemId>> {
        Ok(self.load(page_no).await?.unwrap_or_default())
    }

    pub async fn save(&self, page_no: usize, page: &[ItemId]) -> Result<()> {
        debug!(page = page_no, len = page.len(), "Writing page");
        self.storage.put_json(&self.page_key(page_no), page).await
    }

    pub async fn remove(&self, page_no: usize) -> Result<()> {
        debug!(page = page_no, "Deleting page");
        self.storage.delete(&self.page_key(page_no)).await
    }

    /// Every page of the contiguous prefix starting at 0
    pub async fn scan(&self) -> Result<Vec<Vec<ItemId>>> {
        let mut pages = Vec::new();
        while let Some(page) = self.load(pages.len()).await? {
            pages.push(page);
        }
        Ok(pages)
    }
}
