//! Scripted order venue for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::order::{CancelOutcome, FillStatus, OrderSpec, SignedOrder, SubmitOutcome};
use super::venue::OrderVenue;
use crate::error::TradingError;

/// Scripted answer to the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSubmit {
    /// Accept with a generated id.
    Accept,
    /// Venue rejection.
    Reject(String),
    /// Transport failure.
    Fail(String),
}

/// Scripted answer to cancels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MockCancel {
    /// Venue acknowledges.
    #[default]
    Ack,
    /// Venue reports failure.
    Fail,
    /// Transport failure.
    Error,
}

#[derive(Debug, Default)]
struct MockVenueState {
    script: VecDeque<MockSubmit>,
    cancel: MockCancel,
    fail_status: bool,
    orders: HashMap<String, OrderSpec>,
    fills: HashMap<String, Decimal>,
    submitted: Vec<OrderSpec>,
    cancelled: Vec<String>,
}

/// Order venue with scripted outcomes and a call log.
///
/// Submissions accept by default; queue [`MockSubmit`] values to script the
/// next answers in order. Orders report zero fills until [`MockVenue::fill`].
#[derive(Debug, Clone, Default)]
pub struct MockVenue {
    state: Arc<Mutex<MockVenueState>>,
    next_id: Arc<AtomicU64>,
}

impl MockVenue {
    /// Create a venue that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for the next submissions.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockSubmit>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Set the answer to every cancel.
    pub fn set_cancel(&self, cancel: MockCancel) {
        self.state.lock().cancel = cancel;
    }

    /// Make status queries fail.
    pub fn fail_status(&self, fail: bool) {
        self.state.lock().fail_status = fail;
    }

    /// Mark `matched` shares of an order as filled.
    pub fn fill(&self, order_id: &str, matched: Decimal) {
        self.state.lock().fills.insert(order_id.to_string(), matched);
    }

    /// Fill an order completely.
    pub fn fill_all(&self, order_id: &str) {
        let mut state = self.state.lock();
        if let Some(size) = state.orders.get(order_id).map(|spec| spec.size) {
            state.fills.insert(order_id.to_string(), size);
        }
    }

    /// Every spec passed to `submit`, accepted or not.
    pub fn submitted(&self) -> Vec<OrderSpec> {
        self.state.lock().submitted.clone()
    }

    /// Every order id passed to `cancel`.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    /// Spec of an accepted order.
    pub fn order(&self, order_id: &str) -> Option<OrderSpec> {
        self.state.lock().orders.get(order_id).cloned()
    }
}

#[async_trait]
impl OrderVenue for MockVenue {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn sign(&self, spec: &OrderSpec) -> Result<SignedOrder, TradingError> {
        spec.validate().map_err(TradingError::InvalidParams)?;
        Ok(SignedOrder {
            spec: spec.clone(),
            maker: "0xmock".to_string(),
            nonce: "0".to_string(),
            expiration: 0,
            signature: "0xmock".to_string(),
        })
    }

    async fn submit(&self, order: &SignedOrder) -> Result<SubmitOutcome, TradingError> {
        let mut state = self.state.lock();
        state.submitted.push(order.spec.clone());

        match state.script.pop_front().unwrap_or(MockSubmit::Accept) {
            MockSubmit::Accept => {
                let order_id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                state.orders.insert(order_id.clone(), order.spec.clone());
                Ok(SubmitOutcome::Accepted { order_id })
            }
            MockSubmit::Reject(reason) => Ok(SubmitOutcome::Rejected { reason }),
            MockSubmit::Fail(reason) => Err(TradingError::SubmissionFailed(reason)),
        }
    }

    async fn cancel(&self, order_id: &str) -> Result<CancelOutcome, TradingError> {
        let mut state = self.state.lock();
        state.cancelled.push(order_id.to_string());

        match state.cancel {
            MockCancel::Ack => Ok(CancelOutcome::Acked),
            MockCancel::Fail => Ok(CancelOutcome::Failed {
                reason: "order not found".to_string(),
            }),
            MockCancel::Error => Err(TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: "connection reset".to_string(),
            }),
        }
    }

    async fn status(&self, order_id: &str) -> Result<FillStatus, TradingError> {
        let state = self.state.lock();
        if state.fail_status {
            return Err(TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "timeout".to_string(),
            });
        }

        let original_size = state
            .orders
            .get(order_id)
            .map(|spec| spec.size)
            .ok_or_else(|| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "unknown order".to_string(),
            })?;

        Ok(FillStatus {
            matched_size: state.fills.get(order_id).copied().unwrap_or_default(),
            original_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn submit(venue: &MockVenue, token: &str) -> Result<SubmitOutcome, TradingError> {
        let signed = venue.sign(&OrderSpec::buy(token, dec!(0.5), dec!(10))).await?;
        venue.submit(&signed).await
    }

    #[tokio::test]
    async fn scripted_outcomes_apply_in_order() {
        let venue = MockVenue::new();
        venue.script([MockSubmit::Reject("no".to_string()), MockSubmit::Fail("down".to_string())]);

        assert!(matches!(submit(&venue, "a").await, Ok(SubmitOutcome::Rejected { .. })));
        assert!(submit(&venue, "b").await.is_err());
        assert_eq!(submit(&venue, "c").await.unwrap().order_id(), Some("mock-1"));
        assert_eq!(venue.submitted().len(), 3);
    }

    #[tokio::test]
    async fn fills_drive_status() {
        let venue = MockVenue::new();
        let id = submit(&venue, "a").await.unwrap().order_id().unwrap().to_string();

        assert_eq!(venue.status(&id).await.unwrap().matched_size, dec!(0));
        venue.fill(&id, dec!(4));
        assert_eq!(venue.status(&id).await.unwrap().remaining(), dec!(6));
        venue.fill_all(&id);
        assert!(venue.status(&id).await.unwrap().is_fully_matched());
    }

    #[tokio::test]
    async fn cancel_modes() {
        let venue = MockVenue::new();
        assert_eq!(venue.cancel("x").await.unwrap(), CancelOutcome::Acked);
        venue.set_cancel(MockCancel::Fail);
        assert!(matches!(venue.cancel("x").await.unwrap(), CancelOutcome::Failed { .. }));
        venue.set_cancel(MockCancel::Error);
        assert!(venue.cancel("x").await.is_err());
        assert_eq!(venue.cancelled().len(), 3);
    }
}
