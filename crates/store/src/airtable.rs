//! Airtable REST implementation of [`QuoteStore`].
//!
//! - `GET  {api_url}/v0/{base_id}/{table}?view=..&maxRecords=..&pageSize=..&offset=..`
//! - `POST {api_url}/v0/{base_id}/{table}` with `{"fields": {"quote": ".."}}`

use std::time::Duration;

use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use billbot_core::config::StoreConfig;
use billbot_core::domain::quote::{Quote, QuoteId};

use crate::client::{PageRequest, QuotePage, QuoteStore, StoreError};

const MAX_PAGE_SIZE: usize = 100;

pub struct AirtableQuoteStore {
    client: Client,
    endpoint: Url,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: QuoteFields,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteFields {
    quote: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    fields: CreateFields<'a>,
}

#[derive(Debug, Serialize)]
struct CreateFields<'a> {
    quote: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}

impl AirtableQuoteStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        let endpoint = table_endpoint(&config.api_url, &config.base_id, &config.table)?;

        Ok(Self { client, endpoint, api_key: config.api_key.clone() })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn table_endpoint(api_url: &str, base_id: &str, table: &str) -> Result<Url, StoreError> {
    let mut endpoint = Url::parse(api_url)
        .map_err(|error| StoreError::Transport(format!("invalid store url `{api_url}`: {error}")))?;
    endpoint
        .path_segments_mut()
        .map_err(|_| StoreError::Transport(format!("store url `{api_url}` cannot hold a path")))?
        .pop_if_empty()
        .extend(["v0", base_id, table]);
    Ok(endpoint)
}

fn into_page(response: ListRecordsResponse) -> QuotePage {
    let quotes = response
        .records
        .into_iter()
        .filter_map(|record| {
            let Some(text) = record.fields.quote else {
                debug!(
                    event_name = "store.fetch.record_skipped",
                    quote_id = %record.id,
                    "record has no quote field"
                );
                return None;
            };
            let quote = Quote { id: QuoteId(record.id), text, name: record.fields.name };
            Some(quote)
        })
        .collect();

    QuotePage { quotes, offset: response.offset }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status { status: status.as_u16(), body });
    }

    response.json::<T>().await.map_err(|error| StoreError::Decode(error.to_string()))
}

#[async_trait::async_trait]
impl QuoteStore for AirtableQuoteStore {
    async fn fetch_page(&self, request: &PageRequest) -> Result<QuotePage, StoreError> {
        let mut query = vec![
            ("view", request.view.clone()),
            ("maxRecords", request.max_records.to_string()),
            ("pageSize", request.page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(offset) = &request.offset {
            query.push(("offset", offset.clone()));
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .query(&query)
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        let page = read_json::<ListRecordsResponse>(response).await.map(into_page)?;
        debug!(
            event_name = "store.fetch.page",
            view = %request.view,
            record_count = page.quotes.len(),
            has_more = page.offset.is_some(),
            "fetched quote page"
        );
        Ok(page)
    }

    async fn append_quote(&self, text: &str) -> Result<QuoteId, StoreError> {
        let body = CreateRecordRequest { fields: CreateFields { quote: text } };
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "store.append.transport_failed",
                    error = %error,
                    "append request failed"
                );
                StoreError::Transport(error.to_string())
            })?;

        let created = read_json::<CreatedRecord>(response).await?;
        Ok(QuoteId(created.id))
    }
}
