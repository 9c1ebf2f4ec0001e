//! Search and pagination over the document list shown in the admin page.

use std::ops::Range;

use crate::db::models::Document;

pub const PAGE_SIZE: usize = 10;

/// Case-insensitive substring match on the filename. A blank term keeps the
/// list as it is; otherwise the term is matched as typed, surrounding spaces
/// included.
pub fn filter_by_filename(docs: Vec<Document>, term: &str) -> Vec<Document> {
    if term.trim().is_empty() {
        return docs;
    }
    let needle = term.to_lowercase();
    docs.into_iter()
        .filter(|doc| doc.filename.to_lowercase().contains(&needle))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total_items: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(total_items: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            total_items,
            page_size,
            total_pages: total_items.div_ceil(page_size).max(1),
        }
    }

    /// Page numbers are 1-based; anything outside `1..=total_pages` is pulled
    /// back in.
    pub fn clamp(&self, page: usize) -> usize {
        page.clamp(1, self.total_pages)
    }

    pub fn range(&self, page: usize) -> Range<usize> {
        let page = self.clamp(page);
        let start = ((page - 1) * self.page_size).min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        start..end
    }

    pub fn has_previous(&self, page: usize) -> bool {
        self.clamp(page) > 1
    }

    pub fn has_next(&self, page: usize) -> bool {
        self.clamp(page) < self.total_pages
    }
}

/// One rendered page of the (possibly filtered) document list.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentPage {
    pub items: Vec<Document>,
    pub search_term: String,
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    pub total_documents: usize,
    /// 1-based index of the first item on this page, 0 when the page is empty.
    pub first_index: usize,
    pub last_index: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl DocumentPage {
    pub fn build(all: Vec<Document>, search_term: &str, requested_page: usize) -> Self {
        let total_documents = all.len();
        let filtered = filter_by_filename(all, search_term);
        let pagination = Pagination::new(filtered.len(), PAGE_SIZE);
        let page = pagination.clamp(requested_page);
        let range = pagination.range(page);

        let (first_index, last_index) = if range.is_empty() {
            (0, 0)
        } else {
            (range.start + 1, range.end)
        };

        Self {
            total_matches: filtered.len(),
            items: filtered[range].to_vec(),
            search_term: if search_term.trim().is_empty() {
                String::new()
            } else {
                search_term.to_string()
            },
            page,
            total_pages: pagination.total_pages,
            total_documents,
            first_index,
            last_index,
            has_previous: pagination.has_previous(page),
            has_next: pagination.has_next(page),
        }
    }

    pub fn is_filtered(&self) -> bool {
        !self.search_term.is_empty()
    }
}
