//! Resumable, ID-ordered page iteration over a document store.

use tracing::debug;

use crate::document::ReviewRecord;
use crate::store::{DocumentStore, StoreError, StoreResult};

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MAX_PAGE_SIZE: usize = 1000;

pub fn clamp_page_size(requested: usize) -> usize {
    requested.clamp(1, MAX_PAGE_SIZE)
}

/// Walks the collection in ascending ID order, one page per call, until a
/// page comes back empty.
///
/// The cursor only moves forward. A store returning an ID at or before the
/// cursor is reported as [`StoreError::CursorRegression`] rather than
/// silently reprocessed.
pub struct Scanner<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    page_size: usize,
    cursor: Option<String>,
    pages: usize,
    exhausted: bool,
}

impl<'s, S: DocumentStore + ?Sized> Scanner<'s, S> {
    pub fn new(store: &'s S, page_size: usize, start_after: Option<String>) -> Self {
        Self {
            store,
            page_size: clamp_page_size(page_size),
            cursor: start_after,
            pages: 0,
            exhausted: false,
        }
    }

    /// ID of the last record returned, or the starting cursor.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub async fn next_page(&mut self) -> StoreResult<Option<Vec<ReviewRecord>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self
            .store
            .fetch_page(self.cursor.as_deref(), self.page_size)
            .await?;
        if page.is_empty() {
            debug!(cursor = ?self.cursor, pages = self.pages, "scan exhausted");
            self.exhausted = true;
            return Ok(None);
        }

        let mut previous = self.cursor.as_deref();
        for record in &page {
            if let Some(prev) = previous {
                if record.id.as_str() <= prev {
                    return Err(StoreError::CursorRegression {
                        previous: prev.to_string(),
                        returned: record.id.clone(),
                    });
                }
            }
            previous = Some(record.id.as_str());
        }

        self.pages += 1;
        self.cursor = page.last().map(|record| record.id.clone());
        debug!(page = self.pages, records = page.len(), cursor = ?self.cursor, "fetched page");
        Ok(Some(page))
    }
}
