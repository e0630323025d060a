//! Catalog model: mapper entries, filtering and paged card views.

mod filter;
mod models;
mod pagination;
mod view;

pub use filter::{filter_entries, matches};
pub use models::{CatalogEntry, Mapper, SongRecord};
pub use pagination::{page_window, Pagination, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WINDOW};
pub use view::{Card, CatalogSource, CatalogView, PageView};
