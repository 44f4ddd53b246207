//! Latest-snapshot book cache with freshness checks and pull fallback.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::types::OutcomeBook;
use crate::error::PipelineError;
use crate::market::provider::MarketDataProvider;
use crate::metrics;
use crate::utils::retry::RetryPolicy;

/// A book together with the moment it entered the cache.
#[derive(Debug, Clone)]
pub struct CachedBook {
    /// The snapshot.
    pub book: OutcomeBook,
    /// Ingestion time on the local monotonic clock.
    pub ingested_at: Instant,
}

/// Most recent book per token.
///
/// Written by the real-time feed and by pull fetches, read by the scan
/// loop. Only the latest snapshot is kept.
#[derive(Debug)]
pub struct MarketDataCache {
    books: DashMap<String, CachedBook>,
    retry: RetryPolicy,
}

impl MarketDataCache {
    /// Create an empty cache whose pull fallback uses `retry`.
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            books: DashMap::new(),
            retry,
        }
    }

    /// Store a snapshot, replacing any previous one for the token.
    pub fn insert(&self, book: OutcomeBook) {
        self.books.insert(
            book.token_id.clone(),
            CachedBook {
                book,
                ingested_at: Instant::now(),
            },
        );
    }

    /// Latest snapshot regardless of age.
    pub fn get(&self, token_id: &str) -> Option<OutcomeBook> {
        self.books.get(token_id).map(|entry| entry.book.clone())
    }

    /// Age of the cached snapshot.
    pub fn age(&self, token_id: &str) -> Option<Duration> {
        self.books
            .get(token_id)
            .map(|entry| entry.ingested_at.elapsed())
    }

    /// Whether a snapshot exists and is no older than `max_age`.
    pub fn is_fresh(&self, token_id: &str, max_age: Duration) -> bool {
        self.age(token_id).is_some_and(|age| age <= max_age)
    }

    /// Snapshot if fresh.
    pub fn get_fresh(&self, token_id: &str, max_age: Duration) -> Option<OutcomeBook> {
        let entry = self.books.get(token_id)?;
        (entry.ingested_at.elapsed() <= max_age).then(|| entry.book.clone())
    }

    /// Fresh snapshot, pulling from `provider` when absent or stale.
    ///
    /// A pulled book is written back to the cache. When the pull fails after
    /// retries the instrument is reported as unavailable for this cycle.
    #[instrument(skip(self, provider), fields(token_id = %token_id))]
    pub async fn get_or_fetch(
        &self,
        provider: &dyn MarketDataProvider,
        token_id: &str,
        max_age: Duration,
    ) -> Result<OutcomeBook, PipelineError> {
        if let Some(book) = self.get_fresh(token_id, max_age) {
            metrics::inc_cache_hits();
            return Ok(book);
        }

        debug!(age_ms = ?self.age(token_id).map(|a| a.as_millis()), "Cache miss, pulling book");

        let start = std::time::Instant::now();
        let fetched = self
            .retry
            .run("get_book", || provider.get_book(token_id))
            .await;
        metrics::record_orderbook_fetch_latency(start, provider.venue().as_ref());

        match fetched {
            Ok(book) => {
                self.insert(book.clone());
                Ok(book)
            }
            Err(e) => {
                warn!(error = %e, "Book unavailable");
                Err(PipelineError::DataUnavailable {
                    token_id: token_id.to_string(),
                })
            }
        }
    }

    /// Number of cached tokens.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for MarketDataCache {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
