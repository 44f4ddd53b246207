//! Order book module for managing market data.
//!
//! This module handles:
//! - Canonical book types, normalized at ingestion
//! - Notional-targeted fill pricing
//! - The latest-snapshot cache and its pull fallback
//! - WebSocket feed keeping the cache warm

pub mod cache;
pub mod pricing;
pub mod types;
pub mod websocket;

pub use cache::MarketDataCache;
pub use pricing::{fill_price, top_of_book_notional};
pub use types::{FillInfo, OrderBookSide, OutcomeBook, PriceLevel};
pub use websocket::{FeedEvent, MarketFeed, ReconnectConfig};
