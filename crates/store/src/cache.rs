use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use billbot_core::config::{CacheConfig, StoreConfig};

use crate::client::{QuoteStore, StoreError};
use crate::paging::fetch_quotes;

/// When a cached snapshot must be refetched before it is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Every freshness check refetches.
    Always,
    /// Snapshots younger than the age are served as-is.
    MaxAge(Duration),
}

impl RefreshPolicy {
    pub fn from_max_age(max_age: Option<Duration>) -> Self {
        max_age.map_or(Self::Always, Self::MaxAge)
    }

    fn is_stale(&self, refreshed_at: Option<Instant>) -> bool {
        match (self, refreshed_at) {
            (_, None) | (Self::Always, _) => true,
            (Self::MaxAge(max_age), Some(at)) => at.elapsed() >= *max_age,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub view: String,
    pub max_records: usize,
    pub page_size: usize,
    pub policy: RefreshPolicy,
}

impl CacheSettings {
    pub fn from_config(store: &StoreConfig, cache: &CacheConfig) -> Self {
        Self {
            view: store.view.clone(),
            max_records: store.max_records,
            page_size: store.page_size,
            policy: RefreshPolicy::from_max_age(cache.max_age()),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            view: "Grid view".to_owned(),
            max_records: 300,
            page_size: 100,
            policy: RefreshPolicy::Always,
        }
    }
}

#[derive(Default)]
struct Snapshot {
    quotes: Vec<String>,
    refreshed_at: Option<Instant>,
    /// Bumped by every `invalidate`.
    invalidations: u64,
    /// Value of `invalidations` when the fetch behind `quotes` started.
    covered_invalidations: u64,
}

impl Snapshot {
    fn invalidated(&self) -> bool {
        self.invalidations != self.covered_invalidations
    }
}

/// Shared snapshot of quote texts.
///
/// Reads take the read lock only. A refresh fetches outside the lock and swaps
/// the whole sequence in under the write lock, so readers see either the old or
/// the new snapshot. Refreshes are serialized through `refresh_gate`.
pub struct QuoteCache {
    store: Arc<dyn QuoteStore>,
    settings: CacheSettings,
    snapshot: RwLock<Snapshot>,
    refresh_gate: Mutex<()>,
}

impl QuoteCache {
    pub fn new(store: Arc<dyn QuoteStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            snapshot: RwLock::new(Snapshot::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn QuoteStore> {
        &self.store
    }

    /// Refetches the view and replaces the snapshot. On failure the previous
    /// snapshot is kept.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<usize, StoreError> {
        let covered_invalidations = self.snapshot.read().await.invalidations;
        let fetched = fetch_quotes(
            self.store.as_ref(),
            &self.settings.view,
            self.settings.max_records,
            self.settings.page_size,
        )
        .await;

        match fetched {
            Ok(quotes) => {
                let count = quotes.len();
                let texts = quotes.into_iter().map(|quote| quote.text).collect();
                let mut snapshot = self.snapshot.write().await;
                snapshot.quotes = texts;
                snapshot.refreshed_at = Some(Instant::now());
                // An invalidation that landed mid-fetch keeps the snapshot stale.
                snapshot.covered_invalidations = covered_invalidations;
                drop(snapshot);
                info!(
                    event_name = "store.cache.refreshed",
                    view = %self.settings.view,
                    quote_count = count,
                    "quote cache refreshed"
                );
                Ok(count)
            }
            Err(error) => {
                warn!(
                    event_name = "store.cache.refresh_failed",
                    view = %self.settings.view,
                    error = %error,
                    "quote fetch failed; keeping previous snapshot"
                );
                Err(error)
            }
        }
    }

    /// Refreshes when the policy says the snapshot is stale. Failures are
    /// logged by `refresh` and the stale snapshot stays in place.
    pub async fn ensure_fresh(&self) {
        if !self.is_stale().await {
            debug!(event_name = "store.cache.hit", "serving cached quote snapshot");
            return;
        }

        let _gate = self.refresh_gate.lock().await;
        // A concurrent caller may have refreshed while we waited.
        if !self.is_stale().await {
            return;
        }
        let _ = self.refresh_locked().await;
    }

    pub async fn is_stale(&self) -> bool {
        let snapshot = self.snapshot.read().await;
        snapshot.invalidated() || self.settings.policy.is_stale(snapshot.refreshed_at)
    }

    /// Marks the snapshot stale without discarding it. A refresh already in
    /// flight does not clear the mark.
    pub async fn invalidate(&self) {
        self.snapshot.write().await.invalidations += 1;
    }

    /// Uniform pick over the current snapshot; `None` when it is empty.
    pub async fn pick_random(&self) -> Option<String> {
        let snapshot = self.snapshot.read().await;
        snapshot.quotes.choose(&mut rand::thread_rng()).cloned()
    }

    pub async fn list(&self) -> Vec<String> {
        self.snapshot.read().await.quotes.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.quotes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshot.read().await.quotes.is_empty()
    }

    pub async fn last_refreshed(&self) -> Option<Instant> {
        self.snapshot.read().await.refreshed_at
    }
}
