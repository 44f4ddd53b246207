//! Instrument discovery: turning venue listings into [`Instrument`]s and
//! pairing markets across venues.

use tracing::{debug, info, instrument};

use super::provider::{MarketDataProvider, MarketFilter};
use super::types::{GammaMarket, Instrument, KalshiMarket, Leg};
use crate::error::MarketError;

/// Polymarket event base URL.
pub const POLYMARKET_EVENT_URL: &str = "https://polymarket.com/event";

/// Separator between a Kalshi ticker and the side in a leg token.
pub const KALSHI_SIDE_SEPARATOR: char = '#';

/// Build an instrument from a Gamma listing entry.
///
/// Returns `None` for closed markets and for entries whose outcomes and
/// token ids do not line up.
pub fn instrument_from_gamma(market: GammaMarket) -> Option<Instrument> {
    if market.closed == Some(true) {
        return None;
    }
    if market.outcomes.len() < 2 || market.outcomes.len() != market.clob_token_ids.len() {
        debug!(id = %market.id, "Skipping market with malformed outcomes");
        return None;
    }

    let legs = market
        .outcomes
        .into_iter()
        .zip(market.clob_token_ids)
        .map(|(name, token)| Leg::new(name, token))
        .collect();

    let event_id = market
        .events
        .first()
        .map(|e| e.id.clone())
        .unwrap_or_else(|| market.id.clone());

    Some(Instrument {
        event_id,
        slug: market.slug.unwrap_or_default(),
        label: market.question.unwrap_or_default(),
        volume_24h: market.volume_24hr,
        legs,
        id: market.id,
    })
}

/// Build a binary instrument from a Kalshi market.
///
/// Leg tokens are `TICKER#yes` and `TICKER#no`; both resolve to the same
/// Kalshi order book.
pub fn instrument_from_kalshi(market: KalshiMarket) -> Instrument {
    let label = if market.subtitle.is_empty() {
        market.title
    } else {
        format!("{} {}", market.title, market.subtitle)
    };
    let leg = |side: &str| {
        Leg::new(
            side,
            format!("{}{}{}", market.ticker, KALSHI_SIDE_SEPARATOR, side.to_lowercase()),
        )
    };

    Instrument {
        id: market.ticker.clone(),
        event_id: if market.event_ticker.is_empty() {
            market.ticker.clone()
        } else {
            market.event_ticker.clone()
        },
        slug: market.ticker.clone(),
        label,
        volume_24h: market.volume_24h.unwrap_or_default().into(),
        legs: vec![leg("Yes"), leg("No")],
    }
}

/// Apply `filter` and its limit to an already volume-sorted listing.
pub fn select(instruments: impl IntoIterator<Item = Instrument>, filter: &MarketFilter) -> Vec<Instrument> {
    let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
    instruments
        .into_iter()
        .filter(|i| filter.accepts(i))
        .take(limit)
        .collect()
}

/// Find the Kalshi counterpart of a Polymarket instrument.
///
/// Matches when the Polymarket slug contains the Kalshi ticker or event
/// ticker, or the other way round, case-insensitively.
pub fn find_cross_venue_match<'a>(poly: &Instrument, kalshi: &'a [Instrument]) -> Option<&'a Instrument> {
    let slug = poly.slug.to_lowercase();
    if slug.is_empty() {
        return None;
    }

    kalshi.iter().find(|k| {
        [&k.slug, &k.event_id].into_iter().any(|ticker| {
            let ticker = ticker.to_lowercase();
            !ticker.is_empty() && (slug.contains(&ticker) || ticker.contains(&slug))
        })
    })
}

/// Pair every binary Polymarket instrument with its Kalshi counterpart.
pub fn pair_cross_venue(poly: &[Instrument], kalshi: &[Instrument]) -> Vec<(Instrument, Instrument)> {
    poly.iter()
        .filter(|p| p.is_binary())
        .filter_map(|p| find_cross_venue_match(p, kalshi).map(|k| (p.clone(), k.clone())))
        .collect()
}

/// List both venues and return matched pairs.
#[instrument(skip_all)]
pub async fn discover_cross_venue(
    poly: &dyn MarketDataProvider,
    poly_filter: &MarketFilter,
    kalshi: &dyn MarketDataProvider,
    kalshi_filter: &MarketFilter,
) -> Result<Vec<(Instrument, Instrument)>, MarketError> {
    let (poly_markets, kalshi_markets) =
        tokio::try_join!(poly.list_active(poly_filter), kalshi.list_active(kalshi_filter))?;

    let pairs = pair_cross_venue(&poly_markets, &kalshi_markets);
    info!(
        poly = poly_markets.len(),
        kalshi = kalshi_markets.len(),
        matched = pairs.len(),
        "Cross-venue discovery complete"
    );
    Ok(pairs)
}

/// Public page for a Polymarket slug.
pub fn event_url(slug: &str) -> String {
    format!("{}/{}", POLYMARKET_EVENT_URL, slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn gamma(raw: &str) -> GammaMarket {
        serde_json::from_str(raw).unwrap()
    }

    fn poly(slug: &str) -> Instrument {
        Instrument {
            id: slug.to_string(),
            event_id: "e".to_string(),
            slug: slug.to_string(),
            label: slug.to_string(),
            volume_24h: dec!(50000),
            legs: vec![Leg::new("Yes", "y"), Leg::new("No", "n")],
        }
    }

    #[test]
    fn gamma_binary_market_becomes_instrument() {
        let instrument = instrument_from_gamma(gamma(
            r#"{"id":"7","slug":"fed-cut","question":"Fed cut?","outcomes":"[\"Yes\",\"No\"]",
                "clobTokenIds":"[\"a\",\"b\"]","volume24hr":20000,"events":[{"id":"ev"}]}"#,
        ))
        .unwrap();

        assert!(instrument.is_binary());
        assert_eq!(instrument.event_id, "ev");
        assert_eq!(instrument.legs[1], Leg::new("No", "b"));
        assert_eq!(instrument.volume_24h, dec!(20000));
    }

    #[test]
    fn gamma_market_without_event_uses_own_id() {
        let instrument = instrument_from_gamma(gamma(
            r#"{"id":"7","outcomes":["A","B","C"],"clobTokenIds":["1","2","3"]}"#,
        ))
        .unwrap();
        assert_eq!(instrument.event_id, "7");
        assert_eq!(instrument.legs.len(), 3);
    }

    #[test]
    fn malformed_or_closed_gamma_markets_are_skipped() {
        assert!(instrument_from_gamma(gamma(
            r#"{"id":"1","outcomes":["Yes","No"],"clobTokenIds":["only-one"]}"#
        ))
        .is_none());
        assert!(instrument_from_gamma(gamma(
            r#"{"id":"1","closed":true,"outcomes":["Yes","No"],"clobTokenIds":["a","b"]}"#
        ))
        .is_none());
    }

    #[test]
    fn kalshi_market_has_side_tokens() {
        let instrument = instrument_from_kalshi(KalshiMarket {
            ticker: "FED-25DEC".to_string(),
            event_ticker: "FED".to_string(),
            title: "Fed cut".to_string(),
            subtitle: String::new(),
            volume_24h: Some(1200),
        });
        assert_eq!(instrument.legs[0].token_id, "FED-25DEC#yes");
        assert_eq!(instrument.legs[1].token_id, "FED-25DEC#no");
        assert_eq!(instrument.event_id, "FED");
        assert_eq!(instrument.volume_24h, Decimal::from(1200));
    }

    #[test]
    fn select_respects_limit() {
        let filter = MarketFilter {
            min_volume: dec!(1000),
            keywords: vec![],
            limit: 2,
        };
        let picked = select(vec![poly("a"), poly("b"), poly("c")], &filter);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn cross_venue_matching_uses_containment() {
        let kalshi = vec![
            instrument_from_kalshi(KalshiMarket {
                ticker: "BTC-100K".to_string(),
                event_ticker: String::new(),
                title: "BTC".to_string(),
                subtitle: String::new(),
                volume_24h: None,
            }),
        ];

        assert!(find_cross_venue_match(&poly("will-btc-100k-by-june"), &kalshi).is_some());
        assert!(find_cross_venue_match(&poly("fed-cut"), &kalshi).is_none());
        assert!(find_cross_venue_match(&poly(""), &kalshi).is_none());

        let pairs = pair_cross_venue(&[poly("btc-100k"), poly("other")], &kalshi);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1.slug, "BTC-100K");
    }
}
