//! Offset pagination shared by every listing query.

use serde::{Deserialize, Serialize};

use crate::defaults::{MAX_PAGE_SIZE, PAGE_SIZE};

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request, clamping `page` to at least 1 and `per_page` to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page.max(1)) - 1) * i64::from(self.per_page)
    }

    /// Row limit for this page.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// Apply this page to an already filtered and ordered in-memory list.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Page<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let page_items = items
            .iter()
            .skip(start)
            .take(self.per_page as usize)
            .cloned()
            .collect();
        Page::new(page_items, items.len() as i64, *self)
    }
}

/// One page of results plus the total page count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, request: PageRequest) -> Self {
        Self {
            items,
            total_pages: total_pages(total_count, request.per_page),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_pages: self.total_pages,
        }
    }
}

/// `ceil(count / per_page)`, zero for an empty result.
pub fn total_pages(count: i64, per_page: u32) -> u32 {
    if count <= 0 || per_page == 0 {
        return 0;
    }
    let per_page = i64::from(per_page);
    ((count + per_page - 1) / per_page) as u32
}
