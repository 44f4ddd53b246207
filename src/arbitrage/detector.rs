//! Opportunity detection over cached books.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use super::calculator::{
    evaluate_cross_venue, evaluate_maker_spread, evaluate_taker, BinaryBooks, DetectionParams, Opportunity,
};
use super::sizer::PositionSizer;
use crate::config::Config;
use crate::error::PipelineError;
use crate::market::{Instrument, MarketDataProvider};
use crate::metrics;
use crate::orderbook::{MarketDataCache, OutcomeBook};

/// Applies every strategy to an instrument's books and sizes the results.
#[derive(Debug)]
pub struct OpportunityDetector {
    params: DetectionParams,
    sizer: PositionSizer,
    cache: Arc<MarketDataCache>,
    max_age: Duration,
}

impl OpportunityDetector {
    /// Create a detector reading books through `cache`.
    pub fn new(params: DetectionParams, sizer: PositionSizer, cache: Arc<MarketDataCache>, max_age: Duration) -> Self {
        Self {
            params,
            sizer,
            cache,
            max_age,
        }
    }

    /// Create a detector from config.
    pub fn from_config(config: &Config, cache: Arc<MarketDataCache>) -> Self {
        Self::new(
            DetectionParams::from(config),
            PositionSizer::from(config),
            cache,
            config.max_book_age(),
        )
    }

    /// Detection parameters.
    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Position sizer.
    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    /// Fresh books for every leg, in leg order.
    pub async fn fetch_books(
        &self,
        provider: &dyn MarketDataProvider,
        instrument: &Instrument,
    ) -> Result<Vec<OutcomeBook>, PipelineError> {
        try_join_all(
            instrument
                .legs
                .iter()
                .map(|leg| self.cache.get_or_fetch(provider, &leg.token_id, self.max_age)),
        )
        .await
    }

    /// Run the strategies on already fetched books.
    ///
    /// A leg too thin for its share of the target notional discards the
    /// instrument entirely, including the maker check.
    pub fn detect(&self, instrument: &Instrument, books: &[OutcomeBook]) -> Result<Vec<Opportunity>, PipelineError> {
        if let Some(book) = books.iter().find(|b| b.is_inverted()) {
            warn!(
                market = %instrument.slug,
                token = %book.token_id,
                best_ask = %book.best_ask().unwrap_or_default(),
                best_bid = %book.best_bid().unwrap_or_default(),
                "Order book inverted, skipping"
            );
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        if let Some(opp) = evaluate_taker(instrument, books, &self.params)? {
            found.push(opp);
        }
        if let [yes, no] = books {
            if let Some(opp) = evaluate_maker_spread(instrument, yes, no, &self.params) {
                found.push(opp);
            }
        }

        Ok(found.into_iter().map(|opp| self.finish(opp)).collect())
    }

    /// Fetch and evaluate one instrument.
    #[instrument(skip(self, provider, instrument), fields(market = %instrument.slug))]
    pub async fn scan_instrument(
        &self,
        provider: &dyn MarketDataProvider,
        instrument: &Instrument,
    ) -> Result<Vec<Opportunity>, PipelineError> {
        let books = self.fetch_books(provider, instrument).await?;
        self.detect(instrument, &books)
    }

    /// Fetch and evaluate a matched Polymarket/Kalshi pair.
    #[instrument(skip_all, fields(poly = %poly_instrument.slug, kalshi = %kalshi_instrument.id))]
    pub async fn scan_cross_venue(
        &self,
        poly: &dyn MarketDataProvider,
        poly_instrument: &Instrument,
        kalshi: &dyn MarketDataProvider,
        kalshi_instrument: &Instrument,
    ) -> Result<Vec<Opportunity>, PipelineError> {
        let (poly_books, kalshi_books) = tokio::try_join!(
            self.fetch_books(poly, poly_instrument),
            self.fetch_books(kalshi, kalshi_instrument)
        )?;

        let (Some(poly_pair), Some(kalshi_pair)) = (binary(&poly_books), binary(&kalshi_books)) else {
            return Ok(Vec::new());
        };

        Ok(
            evaluate_cross_venue(poly_instrument, poly_pair, kalshi_instrument, kalshi_pair, &self.params)
                .into_iter()
                .map(|opp| self.finish(opp))
                .collect(),
        )
    }

    fn finish(&self, mut opp: Opportunity) -> Opportunity {
        opp.recommended_notional = self.sizer.size(opp.profit_pct);
        metrics::inc_opportunities_detected(opp.strategy.as_ref());
        info!(
            market = %opp.instrument.slug,
            strategy = %opp.strategy,
            total_cost = %opp.total_cost.round_dp(4),
            profit_pct = %opp.profit_pct.round_dp(2),
            notional = %opp.recommended_notional,
            "Opportunity detected"
        );
        opp
    }
}

fn binary(books: &[OutcomeBook]) -> Option<BinaryBooks<'_>> {
    match books {
        [yes, no] => Some(BinaryBooks { yes, no }),
        _ => {
            debug!(legs = books.len(), "Not a binary book set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::calculator::Strategy;
    use crate::market::mock::{binary_instrument, MockMarketData, MockOrderBookBuilder};
    use crate::market::Venue;
    use crate::utils::RetryPolicy;
    use rust_decimal_macros::dec;

    fn detector() -> OpportunityDetector {
        let config = Config {
            target_trade_size_usd: dec!(40),
            min_liquidity_usd: dec!(0),
            ..Config::default()
        };
        OpportunityDetector::from_config(&config, Arc::new(MarketDataCache::new(RetryPolicy::none())))
    }

    fn profitable(provider: &MockMarketData) -> Instrument {
        let instrument = binary_instrument("m1", "e1", dec!(100000));
        provider.set_order_book(MockOrderBookBuilder::new("m1-yes").ask(dec!(0.40), dec!(125)).build());
        provider.set_order_book(MockOrderBookBuilder::new("m1-no").ask(dec!(0.55), dec!(100)).build());
        instrument
    }

    #[tokio::test]
    async fn scan_sizes_detected_opportunities() {
        let provider = MockMarketData::new();
        let instrument = profitable(&provider);

        let found = detector().scan_instrument(&provider, &instrument).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strategy, Strategy::TakerBinary);
        // 50 * 0.0405 * 0.25 * 10
        assert_eq!(found[0].recommended_notional, dec!(5.0625));
    }

    #[tokio::test]
    async fn failed_fetch_is_data_unavailable() {
        let provider = MockMarketData::new();
        let instrument = profitable(&provider);
        provider.fail_books(true);

        let result = detector().scan_instrument(&provider, &instrument).await;
        assert!(matches!(result, Err(PipelineError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn cached_books_are_reused() {
        let provider = MockMarketData::new();
        let instrument = profitable(&provider);
        let detector = detector();

        detector.scan_instrument(&provider, &instrument).await.unwrap();
        detector.scan_instrument(&provider, &instrument).await.unwrap();
        assert_eq!(provider.book_requests(), 2);
    }

    #[test]
    fn inverted_books_are_skipped() {
        let instrument = binary_instrument("m1", "e1", dec!(100000));
        let yes: OutcomeBook = MockOrderBookBuilder::new("m1-yes")
            .bid(dec!(0.60), dec!(100))
            .ask(dec!(0.40), dec!(125))
            .build()
            .into();
        let no: OutcomeBook = MockOrderBookBuilder::new("m1-no").ask(dec!(0.55), dec!(100)).build().into();

        assert!(detector().detect(&instrument, &[yes, no]).unwrap().is_empty());
    }

    #[test]
    fn wide_bids_produce_a_maker_opportunity() {
        let instrument = binary_instrument("m1", "e1", dec!(100000));
        let book = |token: &str, bid| -> OutcomeBook {
            MockOrderBookBuilder::new(token)
                .bid(bid, dec!(100))
                .ask(dec!(0.60), dec!(1000))
                .build()
                .into()
        };

        let found = detector().detect(&instrument, &[book("m1-yes", dec!(0.45)), book("m1-no", dec!(0.47))]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strategy, Strategy::MakerSpread);
        assert_eq!(found[0].profit_pct, dec!(8));
    }

    #[tokio::test]
    async fn cross_venue_pair_is_priced_across_providers() {
        let poly = MockMarketData::new();
        let kalshi = MockMarketData::for_venue(Venue::Kalshi);
        let poly_instrument = binary_instrument("fed", "e1", dec!(100000));
        let kalshi_instrument = binary_instrument("FED", "K", dec!(100000));

        poly.set_order_book(MockOrderBookBuilder::new("fed-yes").ask(dec!(0.40), dec!(200)).build());
        poly.set_order_book(MockOrderBookBuilder::new("fed-no").ask(dec!(0.70), dec!(200)).build());
        kalshi.set_order_book(MockOrderBookBuilder::new("FED-yes").ask(dec!(0.70), dec!(200)).build());
        kalshi.set_order_book(MockOrderBookBuilder::new("FED-no").ask(dec!(0.50), dec!(200)).build());

        let found = detector()
            .scan_cross_venue(&poly, &poly_instrument, &kalshi, &kalshi_instrument)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strategy, Strategy::CrossVenue);
        assert_eq!(found[0].legs[1].venue, Venue::Kalshi);
        assert!(!found[0].is_executable());
    }
}
