//! Order types exchanged with an order venue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-till-cancelled: rests until filled or cancelled.
    #[default]
    #[strum(serialize = "GTC", serialize = "gtc")]
    GTC,
}

/// What to trade, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    /// Token ID to trade.
    pub token_id: String,
    /// Order side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Share count.
    pub size: Decimal,
    /// Time-in-force.
    pub tif: TimeInForce,
}

impl OrderSpec {
    /// GTC limit buy.
    pub fn buy(token_id: impl Into<String>, price: Decimal, size: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            side: Side::Buy,
            price,
            size,
            tif: TimeInForce::GTC,
        }
    }

    /// Notional at the limit price.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err(format!("price {} outside (0, 1)", self.price));
        }
        if self.size <= Decimal::ZERO {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }
}

/// Order ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOrder {
    /// The order as specified.
    pub spec: OrderSpec,
    /// Maker address.
    pub maker: String,
    /// Nonce for uniqueness.
    pub nonce: String,
    /// Expiration as unix seconds.
    pub expiration: i64,
    /// Hex signature, `0x`-prefixed.
    pub signature: String,
}

/// Venue answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted and resting or matched.
    Accepted {
        /// Venue order id.
        order_id: String,
    },
    /// Declined by the venue.
    Rejected {
        /// Venue reason.
        reason: String,
    },
}

impl SubmitOutcome {
    /// Order id when accepted.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Accepted { order_id } => Some(order_id),
            SubmitOutcome::Rejected { .. } => None,
        }
    }
}

/// Venue answer to a cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The venue confirmed the cancel.
    Acked,
    /// The cancel failed or its result is unknown.
    Failed {
        /// Failure detail.
        reason: String,
    },
}

/// Fill progress of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillStatus {
    /// Shares matched so far.
    pub matched_size: Decimal,
    /// Shares originally ordered.
    pub original_size: Decimal,
}

impl FillStatus {
    /// Whether every share matched.
    pub fn is_fully_matched(&self) -> bool {
        self.original_size > Decimal::ZERO && self.matched_size >= self.original_size
    }

    /// Shares still unmatched.
    pub fn remaining(&self) -> Decimal {
        (self.original_size - self.matched_size).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_defaults_to_gtc() {
        let buy = OrderSpec::buy("token-123", dec!(0.50), dec!(10));
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(buy.tif, TimeInForce::GTC);
        assert_eq!(buy.notional(), dec!(5));
    }

    #[test]
    fn order_spec_validation() {
        assert!(OrderSpec::buy("token", dec!(0.50), dec!(10)).validate().is_ok());
        assert!(OrderSpec::buy("", dec!(0.50), dec!(10)).validate().is_err());
        assert!(OrderSpec::buy("token", dec!(0), dec!(10)).validate().is_err());
        assert!(OrderSpec::buy("token", dec!(1), dec!(10)).validate().is_err());
        assert!(OrderSpec::buy("token", dec!(0.50), dec!(-10)).validate().is_err());
    }

    #[test]
    fn fill_status_matching() {
        let partial = FillStatus {
            matched_size: dec!(4),
            original_size: dec!(10),
        };
        assert!(!partial.is_fully_matched());
        assert_eq!(partial.remaining(), dec!(6));

        let full = FillStatus {
            matched_size: dec!(10),
            original_size: dec!(10),
        };
        assert!(full.is_fully_matched());
        assert!(!FillStatus::default().is_fully_matched());
    }

    #[test]
    fn time_in_force_from_string() {
        use std::str::FromStr;
        assert_eq!(TimeInForce::from_str("gtc").unwrap(), TimeInForce::GTC);
        assert_eq!(Side::from_str("BUY").unwrap(), Side::Buy);
    }
}
