//! Depth-aware fill pricing.

use rust_decimal::Decimal;
use tracing::instrument;

use super::types::{FillInfo, PriceLevel};
use crate::error::PricingError;

/// Blended price to buy `target_notional` USD from an ascending ask side.
///
/// Levels are consumed cheapest first. The last level is taken fractionally
/// so the spend equals the target exactly. If the side runs out first the
/// result is [`PricingError::InsufficientDepth`]; no partial price is ever
/// returned.
#[instrument(level = "trace", skip(levels), fields(target = %target_notional))]
pub fn fill_price(
    levels: &[PriceLevel],
    target_notional: Decimal,
) -> Result<FillInfo, PricingError> {
    if target_notional <= Decimal::ZERO {
        return Err(PricingError::InvalidNotional(target_notional));
    }

    let best_price = match levels.first() {
        Some(level) => level.price,
        None => {
            return Err(PricingError::InsufficientDepth {
                required: target_notional,
                available: Decimal::ZERO,
            })
        }
    };

    let mut spent = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;

    for level in levels {
        if level.price <= Decimal::ZERO {
            continue;
        }

        let remaining = target_notional - spent;
        let level_notional = level.notional();

        if level_notional >= remaining {
            quantity += remaining / level.price;
            return Ok(FillInfo {
                notional: target_notional,
                quantity,
                vwap: target_notional / quantity,
                worst_price: level.price,
                best_price,
            });
        }

        spent += level_notional;
        quantity += level.size;
    }

    Err(PricingError::InsufficientDepth {
        required: target_notional,
        available: spent,
    })
}

/// Notional available at the best level.
pub fn top_of_book_notional(levels: &[PriceLevel]) -> Decimal {
    levels.first().map(PriceLevel::notional).unwrap_or(Decimal::ZERO)
}
