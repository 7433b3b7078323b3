//! Quote storage - remote table access and the in-process quote cache
//!
//! - **Client** (`client`) - the `QuoteStore` port: fetch one page, append one row
//! - **Paging** (`paging`) - lazy page cursor and the capped accumulation loop
//! - **Airtable** (`airtable`) - REST implementation of `QuoteStore`
//! - **Memory** (`memory`) - scripted in-process store for tests and local runs
//! - **Cache** (`cache`) - shared snapshot of quote texts with a refresh policy

pub mod airtable;
pub mod cache;
pub mod client;
pub mod memory;
pub mod paging;

pub use airtable::AirtableQuoteStore;
pub use cache::{CacheSettings, QuoteCache, RefreshPolicy};
pub use client::{PageRequest, QuotePage, QuoteStore, StoreError};
pub use memory::InMemoryQuoteStore;
pub use paging::{fetch_quotes, PageCursor};
