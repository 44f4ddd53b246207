//! Venue that logs intended actions without contacting the exchange.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::order::{CancelOutcome, FillStatus, OrderSpec, SignedOrder, SubmitOutcome};
use super::venue::OrderVenue;
use crate::error::TradingError;

/// Prefix of fabricated order ids.
pub const DRY_RUN_PREFIX: &str = "dry-";

/// Paper venue used when live trading is off.
///
/// Every submission is accepted with a fabricated id and never fills, so
/// paper pairs stay OPEN until the chaser times them out.
#[derive(Debug, Default)]
pub struct DryRunVenue {
    next_id: AtomicU64,
}

impl DryRunVenue {
    /// Create a dry-run venue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders "submitted" so far.
    pub fn submitted(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderVenue for DryRunVenue {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn sign(&self, spec: &OrderSpec) -> Result<SignedOrder, TradingError> {
        spec.validate().map_err(TradingError::InvalidParams)?;
        info!(
            token = %spec.token_id,
            side = %spec.side,
            price = %spec.price,
            size = %spec.size,
            "[DRY RUN] Would sign order"
        );
        Ok(SignedOrder {
            spec: spec.clone(),
            maker: String::new(),
            nonce: "0".to_string(),
            expiration: 0,
            signature: String::new(),
        })
    }

    async fn submit(&self, order: &SignedOrder) -> Result<SubmitOutcome, TradingError> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let order_id = format!("{}{}", DRY_RUN_PREFIX, n);
        info!(
            order_id = %order_id,
            token = %order.spec.token_id,
            price = %order.spec.price,
            size = %order.spec.size,
            notional = %order.spec.notional(),
            "[DRY RUN] Would submit order"
        );
        Ok(SubmitOutcome::Accepted { order_id })
    }

    async fn cancel(&self, order_id: &str) -> Result<CancelOutcome, TradingError> {
        info!(order_id, "[DRY RUN] Would cancel order");
        Ok(CancelOutcome::Acked)
    }

    async fn status(&self, _order_id: &str) -> Result<FillStatus, TradingError> {
        Ok(FillStatus::default())
    }
}
