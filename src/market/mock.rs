//! Mock market data provider for unit testing.
//!
//! This module provides a provider that can be used in tests without making
//! real network requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::provider::{MarketDataProvider, MarketFilter, Venue};
use super::types::{Instrument, Leg};
use crate::error::MarketError;
use crate::orderbook::types::{OutcomeBook, PriceLevel};

/// Mock order book data for testing.
#[derive(Debug, Clone)]
pub struct MockOrderBook {
    /// Token ID.
    pub token_id: String,
    /// Bid levels.
    pub bids: Vec<PriceLevel>,
    /// Ask levels.
    pub asks: Vec<PriceLevel>,
}

impl From<MockOrderBook> for OutcomeBook {
    fn from(mock: MockOrderBook) -> Self {
        OutcomeBook::new(mock.token_id, mock.bids, mock.asks)
    }
}

/// In-memory [`MarketDataProvider`].
///
/// Unknown tokens return an empty book. Clones share state.
#[derive(Debug, Clone)]
pub struct MockMarketData {
    venue: Venue,
    order_books: Arc<Mutex<HashMap<String, MockOrderBook>>>,
    instruments: Arc<Mutex<Vec<Instrument>>>,
    book_requests: Arc<AtomicU32>,
    fail_books: Arc<AtomicBool>,
    rate_limited: Arc<AtomicBool>,
}

impl MockMarketData {
    /// Create an empty Polymarket-flavored mock.
    pub fn new() -> Self {
        Self::for_venue(Venue::Polymarket)
    }

    /// Create an empty mock reporting `venue`.
    pub fn for_venue(venue: Venue) -> Self {
        Self {
            venue,
            order_books: Arc::new(Mutex::new(HashMap::new())),
            instruments: Arc::new(Mutex::new(Vec::new())),
            book_requests: Arc::new(AtomicU32::new(0)),
            fail_books: Arc::new(AtomicBool::new(false)),
            rate_limited: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set a mock order book for a token.
    pub fn set_order_book(&self, book: MockOrderBook) {
        self.order_books.lock().insert(book.token_id.clone(), book);
    }

    /// Replace the listed instruments.
    pub fn set_instruments(&self, instruments: Vec<Instrument>) {
        *self.instruments.lock() = instruments;
    }

    /// Make every book request fail.
    pub fn fail_books(&self, fail: bool) {
        self.fail_books.store(fail, Ordering::SeqCst);
    }

    /// Make listing answer with a rate-limit error.
    pub fn rate_limit_listing(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::SeqCst);
    }

    /// Number of `get_book` calls served so far.
    pub fn book_requests(&self) -> u32 {
        self.book_requests.load(Ordering::SeqCst)
    }

    /// Clear all mock data.
    pub fn clear(&self) {
        self.order_books.lock().clear();
        self.instruments.lock().clear();
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn list_active(&self, filter: &MarketFilter) -> Result<Vec<Instrument>, MarketError> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(MarketError::RateLimited);
        }
        let instruments = self.instruments.lock().clone();
        Ok(super::discovery::select(instruments, filter))
    }

    async fn get_book(&self, token_id: &str) -> Result<OutcomeBook, MarketError> {
        self.book_requests.fetch_add(1, Ordering::SeqCst);

        if self.fail_books.load(Ordering::SeqCst) {
            return Err(MarketError::FetchFailed {
                id: token_id.to_string(),
                reason: "Mock order book failure".to_string(),
            });
        }

        let book = self.order_books.lock().get(token_id).cloned();
        Ok(match book {
            Some(mock) => mock.into(),
            None => OutcomeBook::new(token_id, Vec::new(), Vec::new()),
        })
    }
}

/// Builder for creating mock order books with common patterns.
pub struct MockOrderBookBuilder {
    token_id: String,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl MockOrderBookBuilder {
    /// Create a new builder for the given token.
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level.
    pub fn bid(mut self, price: Decimal, size: Decimal) -> Self {
        self.bids.push(PriceLevel { price, size });
        self
    }

    /// Add an ask level.
    pub fn ask(mut self, price: Decimal, size: Decimal) -> Self {
        self.asks.push(PriceLevel { price, size });
        self
    }

    /// Create a typical order book with spread.
    pub fn with_spread(mut self, best_bid: Decimal, best_ask: Decimal, depth: Decimal) -> Self {
        self.bids = vec![
            PriceLevel::new(best_bid, depth),
            PriceLevel::new(best_bid - Decimal::new(1, 2), depth * Decimal::TWO),
        ];
        self.asks = vec![
            PriceLevel::new(best_ask, depth),
            PriceLevel::new(best_ask + Decimal::new(1, 2), depth * Decimal::TWO),
        ];
        self
    }

    /// Build the mock order book.
    pub fn build(self) -> MockOrderBook {
        MockOrderBook {
            token_id: self.token_id,
            bids: self.bids,
            asks: self.asks,
        }
    }
}

/// Binary instrument with `yes`/`no` leg tokens prefixed by `id`.
pub fn binary_instrument(id: &str, event_id: &str, volume_24h: Decimal) -> Instrument {
    Instrument {
        id: id.to_string(),
        event_id: event_id.to_string(),
        slug: id.to_string(),
        label: format!("Will {id} happen?"),
        volume_24h,
        legs: vec![
            Leg::new("Yes", format!("{id}-yes")),
            Leg::new("No", format!("{id}-no")),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn mock_provider_serves_books() {
        let provider = MockMarketData::new();
        provider.set_order_book(
            MockOrderBookBuilder::new("token-123")
                .with_spread(dec!(0.48), dec!(0.52), dec!(100))
                .build(),
        );

        let book = provider.get_book("token-123").await.unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0.48)));
        assert_eq!(book.best_ask(), Some(dec!(0.52)));

        let empty = provider.get_book("unknown").await.unwrap();
        assert!(empty.asks.is_empty());
        assert_eq!(provider.book_requests(), 2);
    }

    #[tokio::test]
    async fn mock_provider_failure_modes() {
        let provider = MockMarketData::new();
        provider.fail_books(true);
        assert!(provider.get_book("x").await.is_err());

        provider.rate_limit_listing(true);
        let err = provider.list_active(&MarketFilter::default()).await.unwrap_err();
        assert!(matches!(err, MarketError::RateLimited));
    }

    #[tokio::test]
    async fn listing_applies_filter() {
        let provider = MockMarketData::new();
        provider.set_instruments(vec![
            binary_instrument("big", "e1", dec!(90000)),
            binary_instrument("small", "e2", dec!(10)),
        ]);

        let filter = MarketFilter {
            min_volume: dec!(1000),
            ..Default::default()
        };
        let listed = provider.list_active(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "big");
    }
}
