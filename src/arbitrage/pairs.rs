//! Registry of opened hedge pairs and unhedged alerts.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::metrics;
use crate::risk::Exposure;

/// Lifecycle state of a hedge pair.
///
/// Only OPEN pairs live in the registry; the other two are terminal and the
/// pair is removed on reaching them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairState {
    /// Both legs outstanding.
    Open,
    /// Both legs matched.
    Filled,
    /// One leg closed with an aggressive order.
    Chased,
}

/// One resting order of a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairLeg {
    /// Venue order id.
    pub order_id: String,
    /// Token bought.
    pub token_id: String,
    /// Shares ordered.
    pub size: Decimal,
    /// Limit price.
    pub price: Decimal,
}

/// Two leg orders opened together for one opportunity.
#[derive(Debug, Clone)]
pub struct HedgePair {
    /// Registry id.
    pub id: u64,
    /// Market the pair trades.
    pub market_id: String,
    /// First leg submitted.
    pub leg_a: PairLeg,
    /// Second leg submitted.
    pub leg_b: PairLeg,
    /// Capital locked for the pair.
    pub exposure: Exposure,
    /// When both legs were accepted.
    pub created_at: Instant,
    /// Whether a chase order closed one leg.
    pub chased: bool,
    /// Rejected chase attempts so far.
    pub chase_attempts: u32,
    /// Chasing gave up; needs an operator.
    pub stuck: bool,
}

/// Leg A may be live with no offsetting leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnhedgedAlert {
    /// Order whose cancel was not confirmed.
    pub order_id: String,
    /// Token of that order.
    pub token_id: String,
    /// Market of that order.
    pub market_id: String,
    /// Capital left locked.
    pub amount: Decimal,
    /// Cancel failure detail.
    pub reason: String,
    /// When the rollback failed.
    #[serde(with = "time::serde::rfc3339")]
    pub raised_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    pairs: BTreeMap<u64, HedgePair>,
    unhedged: Vec<UnhedgedAlert>,
}

/// Shared store of OPEN pairs, owned jointly by the executor and the chaser.
///
/// Every method takes the lock for a single read or write and never holds it
/// across venue calls.
#[derive(Debug, Default)]
pub struct PairRegistry {
    inner: Mutex<RegistryInner>,
}

impl PairRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair whose legs were both accepted. Returns its id.
    pub async fn open(&self, market_id: &str, leg_a: PairLeg, leg_b: PairLeg, exposure: Exposure) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pairs.insert(
            id,
            HedgePair {
                id,
                market_id: market_id.to_string(),
                leg_a,
                leg_b,
                exposure,
                created_at: Instant::now(),
                chased: false,
                chase_attempts: 0,
                stuck: false,
            },
        );
        metrics::set_open_pairs(inner.pairs.len());
        id
    }

    /// Copy of every OPEN pair, oldest first.
    pub async fn snapshot(&self) -> Vec<HedgePair> {
        self.inner.lock().await.pairs.values().cloned().collect()
    }

    /// Flag a pair as closed by a chase order. Returns false if the pair is gone.
    pub async fn mark_chased(&self, id: u64) -> bool {
        match self.inner.lock().await.pairs.get_mut(&id) {
            Some(pair) => {
                pair.chased = true;
                true
            }
            None => false,
        }
    }

    /// Remove a pair that reached a terminal state.
    pub async fn remove(&self, id: u64) -> Option<HedgePair> {
        let mut inner = self.inner.lock().await;
        let removed = inner.pairs.remove(&id);
        metrics::set_open_pairs(inner.pairs.len());
        removed
    }

    /// Record a rejected chase; flags the pair stuck at `max_attempts`.
    ///
    /// Returns the updated attempt count, or `None` if the pair is gone.
    pub async fn record_chase_failure(&self, id: u64, max_attempts: u32) -> Option<u32> {
        let mut inner = self.inner.lock().await;
        let pair = inner.pairs.get_mut(&id)?;
        pair.chase_attempts += 1;
        pair.stuck = pair.chase_attempts >= max_attempts;
        Some(pair.chase_attempts)
    }

    /// Number of OPEN pairs.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.pairs.len()
    }

    /// Whether no pair is OPEN.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.pairs.is_empty()
    }

    /// Number of pairs flagged stuck.
    pub async fn stuck_count(&self) -> usize {
        self.inner.lock().await.pairs.values().filter(|p| p.stuck).count()
    }

    /// Keep an unhedged alert for reporting.
    pub async fn raise_unhedged(&self, alert: UnhedgedAlert) {
        self.inner.lock().await.unhedged.push(alert);
    }

    /// Outstanding unhedged alerts.
    pub async fn unhedged(&self) -> Vec<UnhedgedAlert> {
        self.inner.lock().await.unhedged.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(id: &str) -> PairLeg {
        PairLeg {
            order_id: id.to_string(),
            token_id: format!("{id}-token"),
            size: dec!(10),
            price: dec!(0.45),
        }
    }

    fn exposure() -> Exposure {
        Exposure {
            event_id: "e".to_string(),
            market_id: "m".to_string(),
            amount: dec!(9),
        }
    }

    #[tokio::test]
    async fn open_assigns_increasing_ids() {
        let registry = PairRegistry::new();
        let first = registry.open("m", leg("a"), leg("b"), exposure()).await;
        let second = registry.open("m", leg("c"), leg("d"), exposure()).await;

        assert!(second > first);
        assert_eq!(registry.len().await, 2);
        let pair = registry.snapshot().await.remove(0);
        assert_eq!(pair.id, first);
        assert!(!pair.chased);
        assert_eq!(pair.leg_a.order_id, "a");
    }

    #[tokio::test]
    async fn mark_chased_sticks_to_the_removed_pair() {
        let registry = PairRegistry::new();
        let id = registry.open("m", leg("a"), leg("b"), exposure()).await;

        assert!(registry.mark_chased(id).await);
        let removed = registry.remove(id).await.unwrap();
        assert!(removed.chased);
        assert!(!registry.mark_chased(id).await);
    }

    #[tokio::test]
    async fn chase_failures_flag_stuck_at_limit() {
        let registry = PairRegistry::new();
        let id = registry.open("m", leg("a"), leg("b"), exposure()).await;

        assert_eq!(registry.record_chase_failure(id, 2).await, Some(1));
        assert_eq!(registry.stuck_count().await, 0);
        assert_eq!(registry.record_chase_failure(id, 2).await, Some(2));
        assert_eq!(registry.stuck_count().await, 1);

        registry.remove(id).await;
        assert!(registry.is_empty().await);
        assert_eq!(registry.record_chase_failure(id, 2).await, None);
    }
}
