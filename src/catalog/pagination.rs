//! Page slicing and the window of page-number controls.

use std::ops::Range;

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_PAGE_WINDOW: usize = 5;

/// Pagination metadata for a list of `total_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page (1-indexed), within `[1, max(total_pages, 1)]`.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
}

impl Pagination {
    /// Out-of-range pages are clamped.
    pub fn new(total_items: usize, page_size: usize, requested_page: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size);
        let page = requested_page.clamp(1, total_pages.max(1));
        Self {
            page,
            total_pages,
            total_items,
            page_size,
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }

    /// Indices of the items on the current page.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset().min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        start..end
    }

    /// 1-based number of the first item shown, 0 when the list is empty.
    pub fn first_item(&self) -> usize {
        if self.total_items == 0 {
            0
        } else {
            self.offset() + 1
        }
    }

    pub fn last_item(&self) -> usize {
        (self.page * self.page_size).min(self.total_items)
    }

    pub fn summary(&self) -> String {
        format!(
            "Showing {} - {} of {} Entries",
            self.first_item(),
            self.last_item(),
            self.total_items
        )
    }

    pub fn contains(&self, page: usize) -> bool {
        page >= 1 && page <= self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn window(&self, width: usize) -> Vec<usize> {
        page_window(self.page, self.total_pages, width)
    }
}

/// Page numbers to offer as controls: `width` pages around `current`,
/// shifted back at the end so the window stays full when possible.
pub fn page_window(current: usize, total_pages: usize, width: usize) -> Vec<usize> {
    if total_pages == 0 || width == 0 {
        return Vec::new();
    }
    let mut start = current.saturating_sub(width / 2).max(1);
    let end = (start + width - 1).min(total_pages);
    if end == total_pages {
        start = (end + 1).saturating_sub(width).max(1);
    }
    (start..=end).collect()
}
