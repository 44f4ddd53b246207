//! Market data provider abstraction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::{AsRefStr, Display};

use super::types::Instrument;
use crate::error::MarketError;
use crate::orderbook::types::OutcomeBook;

/// Venue an instrument or book comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Polymarket CLOB.
    Polymarket,
    /// Kalshi exchange.
    Kalshi,
}

/// Listing filter applied by [`MarketDataProvider::list_active`].
#[derive(Debug, Clone, Default)]
pub struct MarketFilter {
    /// Minimum trailing 24h volume.
    pub min_volume: Decimal,
    /// Lower-case keywords; when non-empty, a label must contain one.
    pub keywords: Vec<String>,
    /// Maximum number of instruments returned.
    pub limit: usize,
}

impl MarketFilter {
    /// Whether an instrument passes the volume and keyword checks.
    pub fn accepts(&self, instrument: &Instrument) -> bool {
        if instrument.volume_24h < self.min_volume {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let label = instrument.label.to_lowercase();
        self.keywords.iter().any(|k| label.contains(k.as_str()))
    }
}

/// Source of instruments and order books.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Venue this provider talks to.
    fn venue(&self) -> Venue;

    /// Active instruments passing `filter`, highest volume first.
    async fn list_active(&self, filter: &MarketFilter) -> Result<Vec<Instrument>, MarketError>;

    /// Current book for one leg, prices normalized to [0, 1].
    async fn get_book(&self, token_id: &str) -> Result<OutcomeBook, MarketError>;
}
