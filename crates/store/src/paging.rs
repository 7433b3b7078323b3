use tracing::debug;

use billbot_core::domain::quote::Quote;

use crate::client::{PageRequest, QuoteStore, StoreError};

/// Lazy walk over the pages of one view. Each call to [`PageCursor::next_page`]
/// issues at most one remote request; [`PageCursor::restart`] rewinds to the
/// first page.
pub struct PageCursor<'a> {
    store: &'a dyn QuoteStore,
    request: PageRequest,
    exhausted: bool,
    pages_read: usize,
}

impl<'a> PageCursor<'a> {
    pub fn new(
        store: &'a dyn QuoteStore,
        view: &str,
        max_records: usize,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            request: PageRequest {
                view: view.to_owned(),
                max_records,
                page_size: page_size.max(1),
                offset: None,
            },
            exhausted: false,
            pages_read: 0,
        }
    }

    /// `None` once the store reported its last page or a page failed.
    pub async fn next_page(&mut self) -> Option<Result<Vec<Quote>, StoreError>> {
        if self.exhausted {
            return None;
        }

        match self.store.fetch_page(&self.request).await {
            Ok(page) => {
                self.pages_read += 1;
                self.exhausted = page.offset.is_none();
                self.request.offset = page.offset;
                Some(Ok(page.quotes))
            }
            Err(error) => {
                self.exhausted = true;
                Some(Err(error))
            }
        }
    }

    pub fn restart(&mut self) {
        self.request.offset = None;
        self.exhausted = false;
        self.pages_read = 0;
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }
}

/// Reads `view` page by page in store order until the store is exhausted or
/// `max_records` quotes are held. Any failed page fails the whole fetch.
pub async fn fetch_quotes(
    store: &dyn QuoteStore,
    view: &str,
    max_records: usize,
    page_size: usize,
) -> Result<Vec<Quote>, StoreError> {
    let mut quotes = Vec::new();
    if max_records == 0 {
        return Ok(quotes);
    }

    let mut cursor = PageCursor::new(store, view, max_records, page_size);
    while let Some(page) = cursor.next_page().await {
        let page = page?;
        let remaining = max_records - quotes.len();
        for quote in page.into_iter().take(remaining) {
            debug!(
                event_name = "store.fetch.record",
                quote_id = %quote.id,
                name = quote.name.as_deref().unwrap_or("unknown"),
                "retrieved quote"
            );
            quotes.push(quote);
        }

        if quotes.len() >= max_records {
            break;
        }
    }

    debug!(
        event_name = "store.fetch.completed",
        view,
        pages = cursor.pages_read(),
        quote_count = quotes.len(),
        "quote fetch completed"
    );
    Ok(quotes)
}
