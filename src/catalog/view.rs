//! View model of the card grid.

use serde::Serialize;
use tracing::debug;

use super::filter::filter_entries;
use super::models::CatalogEntry;
use super::pagination::{Pagination, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WINDOW};

/// What the grid currently lists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogSource {
    Mapper,
    /// Results of the latest query; query time in seconds.
    SearchResults { query_time: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    /// Index of the entry in the source list.
    pub index: usize,
    pub title: String,
    pub singer: String,
    pub genre: String,
    pub image: Option<String>,
    pub similarity: Option<f64>,
    pub playable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub cards: Vec<Card>,
    pub page: usize,
    pub total_pages: usize,
    pub window: Vec<usize>,
    pub summary: String,
    pub has_previous: bool,
    pub has_next: bool,
    pub source: CatalogSource,
}

#[derive(Debug, Clone)]
pub struct CatalogView {
    entries: Vec<CatalogEntry>,
    source: CatalogSource,
    search_text: String,
    page: usize,
    page_size: usize,
    window: usize,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WINDOW)
    }
}

impl CatalogView {
    pub fn new(page_size: usize, window: usize) -> Self {
        Self {
            entries: Vec::new(),
            source: CatalogSource::Mapper,
            search_text: String::new(),
            page: 1,
            page_size: page_size.max(1),
            window,
        }
    }

    /// Replace the listed entries and go back to the first page.
    pub fn set_entries(&mut self, entries: Vec<CatalogEntry>, source: CatalogSource) {
        debug!("Catalog now lists {} entries ({:?})", entries.len(), source);
        self.entries = entries;
        self.source = source;
        self.page = 1;
    }

    pub fn clear(&mut self) {
        self.set_entries(Vec::new(), CatalogSource::Mapper);
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    /// Changing the filter returns to the first page.
    pub fn set_search_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.search_text {
            self.search_text = text;
            self.page = 1;
        }
    }

    pub fn filtered(&self) -> Vec<&CatalogEntry> {
        filter_entries(&self.entries, &self.search_text)
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.filtered().len(), self.page_size, self.page)
    }

    /// Go to `page`. Requests outside `[1, total_pages]` are ignored.
    pub fn request_page(&mut self, page: usize) -> bool {
        if !self.pagination().contains(page) {
            debug!("Ignoring request for page {}", page);
            return false;
        }
        self.page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        let page = self.pagination().page + 1;
        self.request_page(page)
    }

    pub fn previous_page(&mut self) -> bool {
        let page = self.pagination().page.saturating_sub(1);
        self.request_page(page)
    }

    /// The entry behind a card, by source index.
    pub fn entry(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    /// The current page. Cards get a play control only when `audio_ready`
    /// and the entry has an audio reference.
    pub fn page_view(&self, audio_ready: bool) -> PageView {
        let filtered = self.filtered();
        let pagination = Pagination::new(filtered.len(), self.page_size, self.page);
        let cards = filtered[pagination.range()]
            .iter()
            .map(|entry| Card {
                index: entry.index,
                title: entry.title.clone(),
                singer: entry.singer.clone(),
                genre: entry.genre.clone(),
                image: entry.image_path(),
                similarity: entry.similarity,
                playable: audio_ready && entry.audio.is_some(),
            })
            .collect();

        PageView {
            cards,
            page: pagination.page,
            total_pages: pagination.total_pages,
            window: pagination.window(self.window),
            summary: pagination.summary(),
            has_previous: pagination.has_previous(),
            has_next: pagination.has_next(),
            source: self.source,
        }
    }
}
