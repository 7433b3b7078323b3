use tokio::sync::RwLock;

use billbot_core::domain::quote::{Quote, QuoteId};

use crate::client::{PageRequest, QuotePage, QuoteStore, StoreError};

/// Vec-backed store. Pages are slices of `page_size` rows; the offset token is
/// the index of the next row. `max_records` is not applied here so callers
/// must enforce their own cap.
#[derive(Default)]
pub struct InMemoryQuoteStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    quotes: Vec<Quote>,
    fail_page: Option<usize>,
    fail_appends: bool,
    page_requests: usize,
    appended: Vec<String>,
    next_id: usize,
}

impl InMemoryQuoteStore {
    pub fn with_quotes<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let quotes: Vec<Quote> = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Quote::new(record_id(index), text))
            .collect();
        let next_id = quotes.len();
        Self { state: RwLock::new(MemoryState { quotes, next_id, ..MemoryState::default() }) }
    }

    /// Makes the zero-based page `index` fail on every subsequent fetch.
    pub async fn fail_page(&self, index: Option<usize>) {
        self.state.write().await.fail_page = index;
    }

    pub async fn fail_appends(&self, fail: bool) {
        self.state.write().await.fail_appends = fail;
    }

    pub async fn page_requests(&self) -> usize {
        self.state.read().await.page_requests
    }

    /// Texts accepted by `append_quote`, in call order.
    pub async fn appended(&self) -> Vec<String> {
        self.state.read().await.appended.clone()
    }

    pub async fn quotes(&self) -> Vec<Quote> {
        self.state.read().await.quotes.clone()
    }
}

#[async_trait::async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn fetch_page(&self, request: &PageRequest) -> Result<QuotePage, StoreError> {
        let mut state = self.state.write().await;
        state.page_requests += 1;

        let start = match request.offset.as_deref() {
            Some(offset) => offset
                .parse::<usize>()
                .map_err(|_| StoreError::Decode(format!("invalid offset `{offset}`")))?,
            None => 0,
        };
        let page_size = request.page_size.max(1);
        if state.fail_page == Some(start / page_size) {
            return Err(StoreError::Unavailable(format!("page {} unavailable", start / page_size)));
        }

        let end = (start + page_size).min(state.quotes.len());
        let quotes = state.quotes.get(start..end).map(<[Quote]>::to_vec).unwrap_or_default();
        let offset = (end < state.quotes.len()).then(|| end.to_string());
        Ok(QuotePage { quotes, offset })
    }

    async fn append_quote(&self, text: &str) -> Result<QuoteId, StoreError> {
        let mut state = self.state.write().await;
        if state.fail_appends {
            return Err(StoreError::Unavailable("appends disabled".to_owned()));
        }

        let id = record_id(state.next_id);
        state.next_id += 1;
        state.appended.push(text.to_owned());
        state.quotes.push(Quote::new(id.clone(), text));
        Ok(QuoteId(id))
    }
}

fn record_id(index: usize) -> String {
    format!("rec{index:014}")
}
