//! Polymarket market data client (Gamma listings, CLOB books).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::discovery;
use super::provider::{MarketDataProvider, MarketFilter, Venue};
use super::types::{GammaMarket, Instrument};
use crate::config::Config;
use crate::error::MarketError;
use crate::orderbook::types::{OutcomeBook, PriceLevel};

/// Page size requested from Gamma before local filtering.
const GAMMA_PAGE_LIMIT: usize = 1000;

/// Build the shared HTTP client with low-latency settings.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(config.http_timeout_ms))
        .connect_timeout(Duration::from_millis(500))
        // TCP_NODELAY for low-latency (disable Nagle's algorithm)
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(config.http_pool_size)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// Polymarket market data client.
#[derive(Debug, Clone)]
pub struct PolymarketClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for CLOB API.
    clob_url: String,
    /// Base URL for Gamma API.
    gamma_url: String,
}

/// Order book response from API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    /// Bid levels.
    pub bids: Option<Vec<OrderLevel>>,
    /// Ask levels.
    pub asks: Option<Vec<OrderLevel>>,
    /// Market ID.
    pub market: Option<String>,
    /// Asset ID.
    pub asset_id: Option<String>,
}

/// Single price level in order book.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderLevel {
    /// Price at this level.
    pub price: String,
    /// Size available at this level.
    pub size: String,
}

impl OrderBookResponse {
    /// Convert to the canonical book.
    pub fn into_book(self, token_id: &str) -> OutcomeBook {
        let parse_levels = |levels: Option<Vec<OrderLevel>>| -> Vec<PriceLevel> {
            levels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|level| {
                    let price: Decimal = level.price.parse().ok()?;
                    let size: Decimal = level.size.parse().ok()?;
                    Some(PriceLevel { price, size })
                })
                .collect()
        };

        OutcomeBook::new(token_id, parse_levels(self.bids), parse_levels(self.asks))
    }
}

impl PolymarketClient {
    /// Create a new client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        Ok(Self::with_http(build_http_client(config)?, config))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            clob_url: config.polymarket_clob_url.trim_end_matches('/').to_string(),
            gamma_url: config.polymarket_gamma_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for PolymarketClient {
    fn venue(&self) -> Venue {
        Venue::Polymarket
    }

    #[instrument(skip(self, filter), fields(min_volume = %filter.min_volume, limit = filter.limit))]
    async fn list_active(&self, filter: &MarketFilter) -> Result<Vec<Instrument>, MarketError> {
        let url = format!("{}/markets", self.gamma_url);
        let limit = GAMMA_PAGE_LIMIT.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("limit", limit.as_str()),
                ("order", "volume24hr"),
                ("ascending", "false"),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limit (429) hit on Gamma API");
            return Err(MarketError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                id: url,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let markets: Vec<GammaMarket> = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse Gamma markets: {}", e))
        })?;
        let total = markets.len();

        let instruments = discovery::select(
            markets.into_iter().filter_map(discovery::instrument_from_gamma),
            filter,
        );

        debug!(total, kept = instruments.len(), "Listed Polymarket markets");
        Ok(instruments)
    }

    #[instrument(skip(self), fields(token_id = %token_id))]
    async fn get_book(&self, token_id: &str) -> Result<OutcomeBook, MarketError> {
        let url = format!("{}/book", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                id: token_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let book: OrderBookResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse order book: {}", e))
        })?;

        Ok(book.into_book(token_id))
    }
}
