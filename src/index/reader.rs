//! Logical pages over physical pages
//!
//! A logical page is a fixed-size presentation window, numbered from 1. Its
//! position in the flattened timeline is computed from the current capacity
//! assuming every physical page but the last is full, i.e. after compaction.

use super::pages::PageStore;
use super::ItemId;
use crate::error::{Error, Result};
use serde::Serialize;

/// One presentation window plus paging context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalPage {
    /// 1-based page number
    pub number: usize,
    /// Requested window size
    pub size: usize,
    /// `max(1, ceil(count / size))`
    pub total_pages: usize,
    pub ids: Vec<ItemId>,
}

impl LogicalPage {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

/// Number of logical pages needed for `count` ids, at least one
pub fn total_pages(count: u64, logical_size: usize) -> usize {
    let size = logical_size.max(1) as u64;
    (count.div_ceil(size) as usize).max(1)
}

/// Physical page index and offset of the window's first slot
pub fn locate(page_number: usize, logical_size: usize, page_size: usize) -> Result<(usize, usize)> {
    let start = window_start(page_number, logical_size)?;
    Ok((start / page_size, start % page_size))
}

fn window_start(page_number: usize, logical_size: usize) -> Result<usize> {
    if page_number == 0 {
        return Err(Error::InvalidArgument("page number starts at 1".to_string()));
    }
    if logical_size == 0 {
        return Err(Error::InvalidArgument("logical page size must be at least 1".to_string()));
    }
    (page_number - 1)
        .checked_mul(logical_size)
        .ok_or_else(|| Error::InvalidArgument(format!("page number {} out of range", page_number)))
}

/// Ids in the window `[start, start + logical_size)`
///
/// Reads every physical page the window overlaps; a window that fits in one
/// page costs a single read. Stops early at a missing page.
pub(crate) async fn read_window(
    pages: &PageStore,
    page_size: usize,
    page_number: usize,
    logical_size: usize,
) -> Result<Vec<ItemId>> {
    let start = window_start(page_number, logical_size)?;
    let end = start.saturating_add(logical_size);

    let mut ids = Vec::with_capacity(logical_size);
    let mut physical = start / page_size;

    while physical.saturating_mul(page_size) < end {
        let Some(page) = pages.load(physical).await? else {
            break;
        };

        let page_start = physical * page_size;
        let from = start.saturating_sub(page_start);
        let to = (end - page_start).min(page_size).min(page.len());
        if from < to {
            ids.extend_from_slice(&page[from..to]);
        }

        physical += 1;
    }

    Ok(ids)
}
