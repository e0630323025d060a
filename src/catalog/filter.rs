use super::models::CatalogEntry;

/// Case folding shared by every title and singer comparison.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Case-insensitive substring match on title or singer. An empty query matches everything.
pub fn matches(entry: &CatalogEntry, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query = fold_case(query);
    fold_case(&entry.title).contains(&query) || fold_case(&entry.singer).contains(&query)
}

pub fn filter_entries<'a>(entries: &'a [CatalogEntry], query: &str) -> Vec<&'a CatalogEntry> {
    entries.iter().filter(|e| matches(e, query)).collect()
}
