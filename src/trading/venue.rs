//! Order venue abstraction.

use async_trait::async_trait;

use super::order::{CancelOutcome, FillStatus, OrderSpec, SignedOrder, SubmitOutcome};
use crate::error::TradingError;

/// Where orders are signed, placed, cancelled, and tracked.
///
/// `Err` means the call itself failed (transport, signing) after the
/// implementation's own retries; a venue decision is reported in the `Ok`
/// value.
#[async_trait]
pub trait OrderVenue: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Sign an order spec.
    async fn sign(&self, spec: &OrderSpec) -> Result<SignedOrder, TradingError>;

    /// Submit a signed order.
    async fn submit(&self, order: &SignedOrder) -> Result<SubmitOutcome, TradingError>;

    /// Cancel a resting order.
    async fn cancel(&self, order_id: &str) -> Result<CancelOutcome, TradingError>;

    /// Fill progress of an order.
    async fn status(&self, order_id: &str) -> Result<FillStatus, TradingError>;
}
