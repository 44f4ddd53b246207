//! Edge-proportional position sizing.

use rust_decimal::Decimal;

use crate::config::Config;

/// Converts an opportunity's edge into a trade notional.
///
/// `size = bankroll * profit_pct/100 * kelly_fraction * scale`, clamped to
/// `[floor, max_per_market]` and then capped at the target trade size. A
/// non-positive edge gets the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSizer {
    /// Bankroll the fraction applies to.
    pub bankroll: Decimal,
    /// Fractional-Kelly multiplier.
    pub kelly_fraction: Decimal,
    /// Fixed scale constant.
    pub scale: Decimal,
    /// Default floor size.
    pub floor: Decimal,
    /// Per-market ceiling.
    pub max_per_market: Decimal,
    /// Target trade size; the result never exceeds it.
    pub target: Decimal,
}

impl From<&Config> for PositionSizer {
    fn from(config: &Config) -> Self {
        Self {
            bankroll: config.starting_bankroll_usd,
            kelly_fraction: config.kelly_fraction,
            scale: config.sizing_scale,
            floor: config.min_trade_size_usd,
            max_per_market: config.max_exposure_per_market_usd,
            target: config.target_trade_size_usd,
        }
    }
}

impl PositionSizer {
    /// Recommended notional in USD for `profit_pct`.
    pub fn size(&self, profit_pct: Decimal) -> Decimal {
        if profit_pct <= Decimal::ZERO {
            return self.floor;
        }

        let raw = self.bankroll * (profit_pct / Decimal::ONE_HUNDRED) * self.kelly_fraction * self.scale;
        raw.max(self.floor).min(self.max_per_market).min(self.target)
    }

    /// Whether a notional is large enough to trade.
    pub fn meets_floor(&self, notional: Decimal) -> bool {
        notional >= self.floor
    }
}
