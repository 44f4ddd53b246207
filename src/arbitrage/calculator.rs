//! Per-strategy profitability rules.
//!
//! Every rule prices legs with [`fill_price`] against the side being bought
//! and compares the fee-adjusted blended cost with `1 - threshold/100`. A leg
//! that cannot absorb its share of the target notional discards the whole
//! instrument; partial prices are never substituted.

use rust_decimal::Decimal;
use serde::Serialize;
use strum::{AsRefStr, Display};
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::PipelineError;
use crate::market::{Instrument, Venue};
use crate::orderbook::{fill_price, top_of_book_notional, FillInfo, OutcomeBook};

/// Detection strategy that produced an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Buy both sides of a binary market at the asks.
    TakerBinary,
    /// Buy every outcome of a categorical market at the asks.
    TakerCategorical,
    /// Rest bids on both sides of a binary market.
    MakerSpread,
    /// Buy opposite sides on two venues.
    CrossVenue,
}

/// One priced leg of an opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpportunityLeg {
    /// Venue the leg trades on.
    pub venue: Venue,
    /// Outcome name.
    pub name: String,
    /// Token to buy.
    pub token_id: String,
    /// Blended fill price for the leg's notional.
    pub vwap: Decimal,
    /// Limit price for the order (deepest level touched, or the bid).
    pub limit_price: Decimal,
}

impl OpportunityLeg {
    fn from_fill(venue: Venue, name: &str, token_id: &str, fill: &FillInfo) -> Self {
        Self {
            venue,
            name: name.to_string(),
            token_id: token_id.to_string(),
            vwap: fill.vwap,
            limit_price: fill.worst_price,
        }
    }
}

/// Candidate trade produced by one detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    /// Instrument (the Polymarket side for cross-venue).
    pub instrument: Instrument,
    /// Strategy tag.
    pub strategy: Strategy,
    /// Priced legs, in order of execution.
    pub legs: Vec<OpportunityLeg>,
    /// Blended cost per unit payout including fees.
    pub total_cost: Decimal,
    /// `(1 - total_cost) * 100`.
    pub profit_pct: Decimal,
    /// Notional suggested by the sizer; zero until sized.
    pub recommended_notional: Decimal,
    /// Detection time.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl Opportunity {
    fn new(instrument: &Instrument, strategy: Strategy, legs: Vec<OpportunityLeg>, total_cost: Decimal) -> Self {
        Self {
            instrument: instrument.clone(),
            strategy,
            legs,
            total_cost,
            profit_pct: (Decimal::ONE - total_cost) * Decimal::ONE_HUNDRED,
            recommended_notional: Decimal::ZERO,
            detected_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether the executor can open this as a two-leg hedge pair.
    pub fn is_executable(&self) -> bool {
        matches!(self.strategy, Strategy::TakerBinary | Strategy::MakerSpread)
            && self.legs.len() == 2
            && self.legs.iter().all(|l| l.venue == Venue::Polymarket)
    }
}

/// Detection inputs taken from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionParams {
    /// Base margin floor in percent.
    pub min_profit_pct: Decimal,
    /// Per-leg fee buffer in percent.
    pub fee_pct: Decimal,
    /// Minimum bid spread for the maker strategy in percent.
    pub maker_min_spread_pct: Decimal,
    /// Volume below which the buffer applies.
    pub low_volume_threshold_usd: Decimal,
    /// Extra margin for low-volume instruments in percent.
    pub low_volume_buffer_pct: Decimal,
    /// Minimum notional at the best ask of every leg.
    pub min_liquidity_usd: Decimal,
    /// Total notional priced across all legs.
    pub target_notional: Decimal,
}

impl From<&Config> for DetectionParams {
    fn from(config: &Config) -> Self {
        Self {
            min_profit_pct: config.min_profit_pct,
            fee_pct: config.fee_pct,
            maker_min_spread_pct: config.maker_min_spread_pct,
            low_volume_threshold_usd: config.low_volume_threshold_usd,
            low_volume_buffer_pct: config.low_volume_buffer_pct,
            min_liquidity_usd: config.min_liquidity_usd,
            target_notional: config.target_trade_size_usd,
        }
    }
}

impl DetectionParams {
    /// `1 + legs * fee_pct / 100`.
    pub fn fee_multiplier(&self, legs: usize) -> Decimal {
        Decimal::ONE + Decimal::from(legs) * self.fee_pct / Decimal::ONE_HUNDRED
    }

    /// Required margin in percent for an instrument with `volume_24h`.
    pub fn dynamic_threshold(&self, volume_24h: Decimal) -> Decimal {
        if volume_24h < self.low_volume_threshold_usd {
            self.min_profit_pct + self.low_volume_buffer_pct
        } else {
            self.min_profit_pct
        }
    }

    /// Largest fee-adjusted cost that still clears `threshold_pct`.
    pub fn max_cost(threshold_pct: Decimal) -> Decimal {
        Decimal::ONE - threshold_pct / Decimal::ONE_HUNDRED
    }
}

fn price_leg(book: &OutcomeBook, notional: Decimal) -> Result<FillInfo, PipelineError> {
    fill_price(book.asks.levels(), notional).map_err(|source| PipelineError::InsufficientDepth {
        token_id: book.token_id.clone(),
        source,
    })
}

fn has_liquidity(book: &OutcomeBook, min_liquidity: Decimal) -> bool {
    top_of_book_notional(book.asks.levels()) >= min_liquidity
}

/// Taker arbitrage over all legs of an instrument.
///
/// `books` must be aligned with `instrument.legs`. Returns
/// [`PipelineError::InsufficientDepth`] when any leg is too thin and
/// `Ok(None)` when priced but unprofitable or below the liquidity floor.
pub fn evaluate_taker(
    instrument: &Instrument,
    books: &[OutcomeBook],
    params: &DetectionParams,
) -> Result<Option<Opportunity>, PipelineError> {
    let legs = instrument.legs.len();
    if legs < 2 || books.len() != legs {
        return Ok(None);
    }

    if !books.iter().all(|b| has_liquidity(b, params.min_liquidity_usd)) {
        return Ok(None);
    }

    let per_leg = params.target_notional / Decimal::from(legs);
    let fills = books
        .iter()
        .map(|b| price_leg(b, per_leg))
        .collect::<Result<Vec<_>, _>>()?;

    let blended: Decimal = fills.iter().map(|f| f.vwap).sum();
    let total_cost = blended * params.fee_multiplier(legs);
    let threshold = params.dynamic_threshold(instrument.volume_24h);

    if total_cost >= DetectionParams::max_cost(threshold) {
        return Ok(None);
    }

    let strategy = if legs == 2 {
        Strategy::TakerBinary
    } else {
        Strategy::TakerCategorical
    };
    let opp_legs = instrument
        .legs
        .iter()
        .zip(&fills)
        .map(|(leg, fill)| OpportunityLeg::from_fill(Venue::Polymarket, &leg.name, &leg.token_id, fill))
        .collect();

    Ok(Some(Opportunity::new(instrument, strategy, opp_legs, total_cost)))
}

/// Resting-bid spread on a binary instrument.
///
/// Profit is `(1 - (bid_yes + bid_no)) * 100`, reported when at least
/// `maker_min_spread_pct` and when the fee-adjusted bid cost also clears the
/// instrument's dynamic threshold, like every other strategy.
pub fn evaluate_maker_spread(
    instrument: &Instrument,
    yes: &OutcomeBook,
    no: &OutcomeBook,
    params: &DetectionParams,
) -> Option<Opportunity> {
    if !instrument.is_binary() {
        return None;
    }
    let (yes_bid, no_bid) = (yes.best_bid()?, no.best_bid()?);
    let cost = yes_bid + no_bid;
    let profit_pct = (Decimal::ONE - cost) * Decimal::ONE_HUNDRED;
    if profit_pct < params.maker_min_spread_pct {
        return None;
    }
    let threshold = params.dynamic_threshold(instrument.volume_24h);
    if cost * params.fee_multiplier(2) >= DetectionParams::max_cost(threshold) {
        return None;
    }

    let leg = |idx: usize, price: Decimal| OpportunityLeg {
        venue: Venue::Polymarket,
        name: instrument.legs[idx].name.clone(),
        token_id: instrument.legs[idx].token_id.clone(),
        vwap: price,
        limit_price: price,
    };

    Some(Opportunity::new(
        instrument,
        Strategy::MakerSpread,
        vec![leg(0, yes_bid), leg(1, no_bid)],
        cost,
    ))
}

/// Books for both sides of a binary instrument on one venue.
#[derive(Debug, Clone, Copy)]
pub struct BinaryBooks<'a> {
    /// YES book.
    pub yes: &'a OutcomeBook,
    /// NO book.
    pub no: &'a OutcomeBook,
}

/// Cross-venue arbitrage between a Polymarket and a Kalshi instrument.
///
/// Both combinations (Poly YES + Kalshi NO, Kalshi YES + Poly NO) are
/// priced; a combination with a thin leg is skipped without affecting the
/// other.
pub fn evaluate_cross_venue(
    poly: &Instrument,
    poly_books: BinaryBooks<'_>,
    kalshi: &Instrument,
    kalshi_books: BinaryBooks<'_>,
    params: &DetectionParams,
) -> Vec<Opportunity> {
    if !poly.is_binary() || !kalshi.is_binary() {
        return Vec::new();
    }

    let per_leg = params.target_notional / Decimal::TWO;
    let max_cost = DetectionParams::max_cost(params.min_profit_pct);
    let multiplier = params.fee_multiplier(2);

    let combos = [
        (
            (Venue::Polymarket, &poly.legs[0], poly_books.yes),
            (Venue::Kalshi, &kalshi.legs[1], kalshi_books.no),
        ),
        (
            (Venue::Kalshi, &kalshi.legs[0], kalshi_books.yes),
            (Venue::Polymarket, &poly.legs[1], poly_books.no),
        ),
    ];

    combos
        .into_iter()
        .filter_map(|((venue_a, leg_a, book_a), (venue_b, leg_b, book_b))| {
            let fill_a = price_leg(book_a, per_leg).ok()?;
            let fill_b = price_leg(book_b, per_leg).ok()?;
            let total_cost = (fill_a.vwap + fill_b.vwap) * multiplier;
            (total_cost < max_cost).then(|| {
                Opportunity::new(
                    poly,
                    Strategy::CrossVenue,
                    vec![
                        OpportunityLeg::from_fill(venue_a, &leg_a.name, &leg_a.token_id, &fill_a),
                        OpportunityLeg::from_fill(venue_b, &leg_b.name, &leg_b.token_id, &fill_b),
                    ],
                    total_cost,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::binary_instrument;
    use crate::market::Leg;
    use crate::orderbook::PriceLevel;
    use rust_decimal_macros::dec;

    fn params() -> DetectionParams {
        DetectionParams {
            min_profit_pct: dec!(1),
            fee_pct: dec!(0.5),
            maker_min_spread_pct: dec!(2),
            low_volume_threshold_usd: dec!(50000),
            low_volume_buffer_pct: dec!(0.5),
            min_liquidity_usd: dec!(0),
            target_notional: dec!(40),
        }
    }

    fn asks(token: &str, levels: &[(Decimal, Decimal)]) -> OutcomeBook {
        OutcomeBook::new(
            token,
            vec![],
            levels.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect::<Vec<_>>(),
        )
    }

    fn bids(token: &str, price: Decimal) -> OutcomeBook {
        OutcomeBook::new(token, vec![PriceLevel::new(price, dec!(100))], vec![])
    }

    #[test]
    fn scenario_a_binary_taker_opportunity() {
        let instrument = binary_instrument("m", "e", dec!(100000));
        // $50 of depth at the best ask on each side, $20 per leg.
        let yes = asks("m-yes", &[(dec!(0.40), dec!(125))]);
        let no = asks("m-no", &[(dec!(0.55), dec!(50) / dec!(0.55))]);

        let opp = evaluate_taker(&instrument, &[yes, no], &params())
            .unwrap()
            .expect("opportunity");

        assert_eq!(opp.strategy, Strategy::TakerBinary);
        assert_eq!(opp.total_cost.round_dp(4), dec!(0.9595));
        assert_eq!(opp.profit_pct.round_dp(2), dec!(4.05));
        assert_eq!(opp.legs[0].token_id, "m-yes");
        assert_eq!(opp.legs[1].limit_price, dec!(0.55));
        assert!(opp.is_executable());
    }

    #[test]
    fn scenario_d_thin_books_emit_nothing() {
        let instrument = binary_instrument("m", "e", dec!(100000));
        let yes = asks("m-yes", &[(dec!(0.40), dec!(10))]);
        let no = asks("m-no", &[(dec!(0.55), dec!(10))]);

        let result = evaluate_taker(&instrument, &[yes, no], &params());
        assert!(matches!(
            result,
            Err(PipelineError::InsufficientDepth { ref token_id, .. }) if token_id == "m-yes"
        ));
    }

    #[test]
    fn unprofitable_books_are_not_flagged() {
        let instrument = binary_instrument("m", "e", dec!(100000));
        let yes = asks("m-yes", &[(dec!(0.50), dec!(1000))]);
        let no = asks("m-no", &[(dec!(0.49), dec!(1000))]);
        // 0.99 * 1.01 = 0.9999 >= 0.99
        assert!(evaluate_taker(&instrument, &[yes, no], &params()).unwrap().is_none());
    }

    #[test]
    fn low_volume_raises_the_bar() {
        let p = params();
        assert_eq!(p.dynamic_threshold(dec!(100000)), dec!(1));
        assert_eq!(p.dynamic_threshold(dec!(1000)), dec!(1.5));

        // 0.976 * 1.01 = 0.98576: under 0.99, over 0.985.
        let yes = asks("m-yes", &[(dec!(0.476), dec!(1000))]);
        let no = asks("m-no", &[(dec!(0.50), dec!(1000))]);
        let liquid = binary_instrument("m", "e", dec!(100000));
        let thin = binary_instrument("m", "e", dec!(1000));
        assert!(evaluate_taker(&liquid, &[yes.clone(), no.clone()], &p).unwrap().is_some());
        assert!(evaluate_taker(&thin, &[yes, no], &p).unwrap().is_none());
    }

    #[test]
    fn liquidity_floor_filters_top_of_book() {
        let instrument = binary_instrument("m", "e", dec!(100000));
        let p = DetectionParams {
            min_liquidity_usd: dec!(100),
            ..params()
        };
        let yes = asks("m-yes", &[(dec!(0.40), dec!(125)), (dec!(0.41), dec!(1000))]);
        let no = asks("m-no", &[(dec!(0.50), dec!(1000))]);
        assert!(evaluate_taker(&instrument, &[yes, no], &p).unwrap().is_none());
    }

    #[test]
    fn categorical_uses_n_legs() {
        let instrument = Instrument {
            legs: vec![Leg::new("A", "a"), Leg::new("B", "b"), Leg::new("C", "c")],
            ..binary_instrument("cat", "e", dec!(100000))
        };
        let p = DetectionParams {
            target_notional: dec!(30),
            ..params()
        };
        let books = [
            asks("a", &[(dec!(0.30), dec!(100))]),
            asks("b", &[(dec!(0.30), dec!(100))]),
            asks("c", &[(dec!(0.30), dec!(100))]),
        ];

        let opp = evaluate_taker(&instrument, &books, &p).unwrap().unwrap();
        assert_eq!(opp.strategy, Strategy::TakerCategorical);
        // 0.90 * (1 + 3 * 0.005)
        assert_eq!(opp.total_cost, dec!(0.9135));
        assert!(!opp.is_executable());

        let thin = [
            asks("a", &[(dec!(0.30), dec!(100))]),
            asks("b", &[(dec!(0.30), dec!(1))]),
            asks("c", &[(dec!(0.30), dec!(100))]),
        ];
        assert!(evaluate_taker(&instrument, &thin, &p).is_err());
    }

    #[test]
    fn maker_spread_uses_best_bids() {
        let instrument = binary_instrument("m", "e", dec!(100000));
        let opp = evaluate_maker_spread(&instrument, &bids("m-yes", dec!(0.45)), &bids("m-no", dec!(0.52)), &params())
            .unwrap();
        assert_eq!(opp.profit_pct, dec!(3));
        assert_eq!(opp.legs[0].limit_price, dec!(0.45));
        assert!(opp.is_executable());

        assert!(evaluate_maker_spread(&instrument, &bids("m-yes", dec!(0.49)), &bids("m-no", dec!(0.50)), &params())
            .is_none());
    }

    #[test]
    fn maker_spread_respects_fees_and_low_volume_margin() {
        let yes = bids("m-yes", dec!(0.49));
        let no = bids("m-no", dec!(0.49));

        // 2% spread clears the maker floor; 0.98 * 1.01 = 0.9898.
        let liquid = binary_instrument("m", "e", dec!(100000));
        assert!(evaluate_maker_spread(&liquid, &yes, &no, &params()).is_some());

        // Low volume needs cost under 0.985.
        let thin = binary_instrument("m", "e", dec!(1000));
        assert!(evaluate_maker_spread(&thin, &yes, &no, &params()).is_none());

        // Fees alone can sink a spread that clears the floor.
        let costly = DetectionParams {
            fee_pct: dec!(1),
            ..params()
        };
        assert!(evaluate_maker_spread(&liquid, &yes, &no, &costly).is_none());
    }

    #[test]
    fn cross_venue_prices_both_combinations() {
        let poly = binary_instrument("p", "e", dec!(100000));
        let kalshi = Instrument {
            legs: vec![Leg::new("Yes", "K#yes"), Leg::new("No", "K#no")],
            ..binary_instrument("K", "K", dec!(0))
        };

        let p_yes = asks("p-yes", &[(dec!(0.40), dec!(1000))]);
        let p_no = asks("p-no", &[(dec!(0.62), dec!(1000))]);
        let k_yes = asks("K#yes", &[(dec!(0.45), dec!(1000))]);
        let k_no = asks("K#no", &[(dec!(0.55), dec!(1000))]);

        let opps = evaluate_cross_venue(
            &poly,
            BinaryBooks { yes: &p_yes, no: &p_no },
            &kalshi,
            BinaryBooks { yes: &k_yes, no: &k_no },
            &params(),
        );

        // Poly YES + Kalshi NO = 0.95 * 1.01 clears; Kalshi YES + Poly NO = 1.07 does not.
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].legs[0].venue, Venue::Polymarket);
        assert_eq!(opps[0].legs[1].token_id, "K#no");
        assert!(!opps[0].is_executable());
    }
}
