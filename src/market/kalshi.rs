//! Kalshi public market data client.
//!
//! Kalshi books publish resting bids in cents for both sides. Buying YES
//! crosses a NO bid, so the YES ask ladder is derived from NO bids as
//! `1 - p/100` (and the other way round).

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::discovery::{self, KALSHI_SIDE_SEPARATOR};
use super::provider::{MarketDataProvider, MarketFilter, Venue};
use super::types::{Instrument, KalshiMarket, Outcome};
use crate::config::Config;
use crate::error::MarketError;
use crate::orderbook::types::{OutcomeBook, PriceLevel};

/// Kalshi market data client.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    http: reqwest::Client,
    api_url: String,
    max_markets: usize,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: Vec<KalshiMarket>,
}

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    orderbook: KalshiOrderbook,
}

/// Raw Kalshi book: `[price_cents, quantity]` bid levels per side.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KalshiOrderbook {
    /// YES bids.
    #[serde(default)]
    pub yes: Option<Vec<[i64; 2]>>,
    /// NO bids.
    #[serde(default)]
    pub no: Option<Vec<[i64; 2]>>,
}

impl KalshiOrderbook {
    /// Canonical book for one side, prices in [0, 1].
    pub fn to_book(&self, token_id: &str, side: Outcome) -> OutcomeBook {
        let hundred = Decimal::ONE_HUNDRED;
        let (own, opposite) = match side {
            Outcome::Yes => (&self.yes, &self.no),
            Outcome::No => (&self.no, &self.yes),
        };

        let bids = own
            .iter()
            .flatten()
            .map(|[cents, qty]| PriceLevel::new(Decimal::from(*cents) / hundred, Decimal::from(*qty)));
        let asks = opposite.iter().flatten().map(|[cents, qty]| {
            PriceLevel::new(Decimal::ONE - Decimal::from(*cents) / hundred, Decimal::from(*qty))
        });

        OutcomeBook::new(token_id, bids.collect::<Vec<_>>(), asks.collect::<Vec<_>>())
    }
}

/// Split a leg token into ticker and side. A bare ticker means YES.
pub fn parse_leg_token(token_id: &str) -> (&str, Outcome) {
    match token_id.rsplit_once(KALSHI_SIDE_SEPARATOR) {
        Some((ticker, side)) if side.eq_ignore_ascii_case("no") => (ticker, Outcome::No),
        Some((ticker, _)) => (ticker, Outcome::Yes),
        None => (token_id, Outcome::Yes),
    }
}

impl KalshiClient {
    /// Create a client around the shared HTTP client.
    pub fn with_http(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_url: config.kalshi_api_url.trim_end_matches('/').to_string(),
            max_markets: config.max_cross_markets,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
        id: &str,
    ) -> Result<T, MarketError> {
        let response = self.http.get(url).query(query).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "Rate limit (429) hit on Kalshi API");
            return Err(MarketError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                id: id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse Kalshi response: {}", e)))
    }
}

#[async_trait]
impl MarketDataProvider for KalshiClient {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    #[instrument(skip(self, filter))]
    async fn list_active(&self, filter: &MarketFilter) -> Result<Vec<Instrument>, MarketError> {
        let url = format!("{}/markets", self.api_url);
        let limit = if filter.limit == 0 { self.max_markets } else { filter.limit };
        let body: MarketsResponse = self
            .get(
                &url,
                &[("limit", limit.to_string()), ("status", "open".to_string())],
                "kalshi-markets",
            )
            .await?;

        let instruments = discovery::select(
            body.markets.into_iter().map(discovery::instrument_from_kalshi),
            filter,
        );
        debug!(count = instruments.len(), "Listed Kalshi markets");
        Ok(instruments)
    }

    #[instrument(skip(self), fields(token_id = %token_id))]
    async fn get_book(&self, token_id: &str) -> Result<OutcomeBook, MarketError> {
        let (ticker, side) = parse_leg_token(token_id);
        let url = format!("{}/markets/{}/orderbook", self.api_url, ticker);
        let body: OrderbookResponse = self.get(&url, &[], ticker).await?;
        Ok(body.orderbook.to_book(token_id, side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn leg_tokens_resolve_to_ticker_and_side() {
        assert_eq!(parse_leg_token("FED-25DEC#no"), ("FED-25DEC", Outcome::No));
        assert_eq!(parse_leg_token("FED-25DEC#yes"), ("FED-25DEC", Outcome::Yes));
        assert_eq!(parse_leg_token("FED-25DEC"), ("FED-25DEC", Outcome::Yes));
    }

    #[test]
    fn asks_come_from_opposite_bids() {
        let raw = r#"{"orderbook": {"yes": [[40, 100], [42, 50]], "no": [[55, 30], [57, 10]]}}"#;
        let parsed: OrderbookResponse = serde_json::from_str(raw).unwrap();

        let yes = parsed.orderbook.to_book("T#yes", Outcome::Yes);
        assert_eq!(yes.best_bid(), Some(dec!(0.42)));
        // Best NO bid 57c means YES can be bought at 43c.
        assert_eq!(yes.best_ask(), Some(dec!(0.43)));

        let no = parsed.orderbook.to_book("T#no", Outcome::No);
        assert_eq!(no.best_ask(), Some(dec!(0.58)));
        assert_eq!(no.asks.levels()[0].size, dec!(50));
    }

    #[test]
    fn empty_side_is_null() {
        let parsed: OrderbookResponse =
            serde_json::from_str(r#"{"orderbook": {"yes": null, "no": [[10, 5]]}}"#).unwrap();
        let no = parsed.orderbook.to_book("T#no", Outcome::No);
        assert!(no.asks.is_empty());
        assert_eq!(no.best_bid(), Some(dec!(0.10)));
    }
}
