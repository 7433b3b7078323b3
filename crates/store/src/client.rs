use async_trait::async_trait;
use thiserror::Error;

use billbot_core::domain::quote::{Quote, QuoteId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("quote store request failed: {0}")]
    Transport(String),
    #[error("quote store returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode quote store response: {0}")]
    Decode(String),
    #[error("quote store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub view: String,
    pub max_records: usize,
    pub page_size: usize,
    /// Continuation token from the previous page; `None` requests the first page.
    pub offset: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotePage {
    pub quotes: Vec<Quote>,
    /// `None` once the remote store has no further pages.
    pub offset: Option<String>,
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<QuotePage, StoreError>;
    async fn append_quote(&self, text: &str) -> Result<QuoteId, StoreError>;
}
