//! Canonical order book types.
//!
//! Every source (REST snapshot, WebSocket feed, Kalshi adapter) produces
//! these types once at ingestion; pricing and detection only ever see sorted,
//! positive-size levels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level, in [0, 1].
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// USD notional resting at this level.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// One side of a book, kept in execution order.
///
/// Asks are ascending by price and bids descending, so the first level is
/// always the best one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBookSide {
    levels: Vec<PriceLevel>,
}

impl OrderBookSide {
    /// Build an ask side (ascending). Non-positive sizes are dropped.
    pub fn asks(levels: impl IntoIterator<Item = PriceLevel>) -> Self {
        let mut levels = Self::clean(levels);
        levels.sort_by(|a, b| a.price.cmp(&b.price));
        Self { levels }
    }

    /// Build a bid side (descending). Non-positive sizes are dropped.
    pub fn bids(levels: impl IntoIterator<Item = PriceLevel>) -> Self {
        let mut levels = Self::clean(levels);
        levels.sort_by(|a, b| b.price.cmp(&a.price));
        Self { levels }
    }

    fn clean(levels: impl IntoIterator<Item = PriceLevel>) -> Vec<PriceLevel> {
        levels
            .into_iter()
            .filter(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO)
            .collect()
    }

    /// Levels in execution order.
    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }

    /// Best level, if any.
    pub fn best(&self) -> Option<&PriceLevel> {
        self.levels.first()
    }

    /// Best price, if any.
    pub fn best_price(&self) -> Option<Decimal> {
        self.best().map(|l| l.price)
    }

    /// Whether the side has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }
}

/// L2 order book for one outcome token.
#[derive(Debug, Clone)]
pub struct OutcomeBook {
    /// Token ID this book represents.
    pub token_id: String,
    /// Bid levels sorted by price descending.
    pub bids: OrderBookSide,
    /// Ask levels sorted by price ascending.
    pub asks: OrderBookSide,
}

impl OutcomeBook {
    /// Build a book from unsorted levels.
    pub fn new(
        token_id: impl Into<String>,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            bids: OrderBookSide::bids(bids),
            asks: OrderBookSide::asks(asks),
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    /// Check if the book is crossed or locked (best_bid >= best_ask).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}

/// Result of pricing a target notional against one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillInfo {
    /// Notional spent (equals the target).
    pub notional: Decimal,
    /// Quantity acquired.
    pub quantity: Decimal,
    /// Blended price: notional / quantity.
    pub vwap: Decimal,
    /// Deepest price touched.
    pub worst_price: Decimal,
    /// Price of the first level.
    pub best_price: Decimal,
}
