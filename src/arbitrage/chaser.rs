//! Periodic reconciliation of open hedge pairs.
//!
//! Each tick reads fill status for both legs of every OPEN pair. Filled pairs
//! are released and removed. Past the hedge timeout, a pair with exactly one
//! filled leg has its other leg cancelled and re-bought at the chase price.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::pairs::{HedgePair, PairLeg, PairRegistry, PairState};
use crate::config::Config;
use crate::error::PipelineError;
use crate::metrics;
use crate::risk::RiskManager;
use crate::trading::{CancelOutcome, FillStatus, OrderSpec, OrderVenue, SubmitOutcome};

/// Chase settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaseParams {
    /// Age after which an asymmetric pair is chased.
    pub hedge_timeout: Duration,
    /// Price cap of the aggressive order.
    pub max_chase_price: Decimal,
    /// Rejected chases before a pair is flagged stuck.
    pub max_chase_attempts: u32,
}

impl From<&Config> for ChaseParams {
    fn from(config: &Config) -> Self {
        Self {
            hedge_timeout: config.hedge_timeout(),
            max_chase_price: config.max_chase_price,
            max_chase_attempts: config.max_chase_attempts,
        }
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Pairs removed as FILLED.
    pub filled: Vec<u64>,
    /// Pairs removed as CHASED.
    pub chased: Vec<u64>,
    /// Rejected chase orders.
    pub chase_failures: Vec<PipelineError>,
    /// Pairs left OPEN.
    pub open: usize,
    /// OPEN pairs flagged stuck.
    pub stuck: Vec<u64>,
    /// Pairs removed this tick, as they left the registry.
    pub closed: Vec<HedgePair>,
}

enum Reconcile {
    Keep,
    Filled,
    Chase { leg: PairLeg, remaining: Decimal },
    Stuck,
}

/// Reconciliation task over the pair registry.
pub struct HedgeChaser {
    venue: Arc<dyn OrderVenue>,
    risk: Arc<RiskManager>,
    registry: Arc<PairRegistry>,
    params: ChaseParams,
}

impl HedgeChaser {
    /// Create a chaser.
    pub fn new(
        venue: Arc<dyn OrderVenue>,
        risk: Arc<RiskManager>,
        registry: Arc<PairRegistry>,
        params: ChaseParams,
    ) -> Self {
        Self {
            venue,
            risk,
            registry,
            params,
        }
    }

    /// Reconcile every OPEN pair as of now.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    /// Reconcile every OPEN pair, measuring ages against `now`.
    #[instrument(skip(self, now))]
    pub async fn tick_at(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        for pair in self.registry.snapshot().await {
            match self.classify(&pair, now).await {
                Reconcile::Keep => report.open += 1,
                Reconcile::Stuck => {
                    error!(
                        pair_id = pair.id,
                        market = %pair.market_id,
                        attempts = pair.chase_attempts,
                        "Hedge pair stuck after repeated chase rejections"
                    );
                    report.open += 1;
                    report.stuck.push(pair.id);
                }
                Reconcile::Filled => {
                    report.closed.extend(self.close(&pair, PairState::Filled).await);
                    metrics::inc_pairs_filled();
                    report.filled.push(pair.id);
                }
                Reconcile::Chase { leg, remaining } => match self.chase(&pair, &leg, remaining).await {
                    Ok(()) => {
                        self.registry.mark_chased(pair.id).await;
                        report.closed.extend(self.close(&pair, PairState::Chased).await);
                        report.chased.push(pair.id);
                    }
                    Err(e) => {
                        let attempts = self
                            .registry
                            .record_chase_failure(pair.id, self.params.max_chase_attempts)
                            .await;
                        warn!(pair_id = pair.id, attempts = ?attempts, error = %e, "Chase failed, pair stays open");
                        report.open += 1;
                        report.chase_failures.push(e);
                    }
                },
            }
        }

        for alert in self.registry.unhedged().await {
            error!(
                event_type = "UNHEDGED_EXPOSURE",
                order_id = %alert.order_id,
                token = %alert.token_id,
                market = %alert.market_id,
                amount = %alert.amount,
                reason = %alert.reason,
                "UNHEDGED EXPOSURE outstanding"
            );
        }

        debug!(
            filled = report.filled.len(),
            chased = report.chased.len(),
            open = report.open,
            "Reconciliation tick complete"
        );
        report
    }

    /// Tick every `interval` until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_s = interval.as_secs(), "Hedge chaser started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Hedge chaser stopped");
    }

    async fn classify(&self, pair: &HedgePair, now: Instant) -> Reconcile {
        let statuses = tokio::try_join!(
            self.venue.status(&pair.leg_a.order_id),
            self.venue.status(&pair.leg_b.order_id)
        );
        let (a, b): (FillStatus, FillStatus) = match statuses {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(pair_id = pair.id, error = %e, "Status query failed, pair stays open");
                return Reconcile::Keep;
            }
        };

        if a.is_fully_matched() && b.is_fully_matched() {
            return Reconcile::Filled;
        }
        if now.saturating_duration_since(pair.created_at) < self.params.hedge_timeout {
            return Reconcile::Keep;
        }

        let (leg, status) = match (a.is_fully_matched(), b.is_fully_matched()) {
            (true, false) => (&pair.leg_b, b),
            (false, true) => (&pair.leg_a, a),
            _ => {
                debug!(pair_id = pair.id, "Neither leg matched at timeout, leaving as is");
                return Reconcile::Keep;
            }
        };

        if pair.stuck {
            return Reconcile::Stuck;
        }
        Reconcile::Chase {
            leg: leg.clone(),
            remaining: status.remaining(),
        }
    }

    async fn chase(&self, pair: &HedgePair, leg: &PairLeg, remaining: Decimal) -> Result<(), PipelineError> {
        info!(
            pair_id = pair.id,
            order_id = %leg.order_id,
            token = %leg.token_id,
            %remaining,
            price = %self.params.max_chase_price,
            "Chasing unmatched leg"
        );

        let chase_failed = |reason: String| PipelineError::ChaseFailed {
            pair_id: pair.id,
            reason,
        };

        match self.venue.cancel(&leg.order_id).await {
            Ok(CancelOutcome::Acked) => {}
            Ok(CancelOutcome::Failed { reason }) => warn!(order_id = %leg.order_id, %reason, "Resting leg cancel failed"),
            Err(e) => warn!(order_id = %leg.order_id, error = %e, "Resting leg cancel failed"),
        }

        let spec = OrderSpec::buy(&leg.token_id, self.params.max_chase_price, remaining);
        let signed = self.venue.sign(&spec).await.map_err(|e| chase_failed(e.to_string()))?;
        match self.venue.submit(&signed).await {
            Ok(SubmitOutcome::Accepted { order_id }) => {
                metrics::inc_chases("accepted");
                info!(pair_id = pair.id, chase_order = %order_id, "Chase order accepted");
                Ok(())
            }
            Ok(SubmitOutcome::Rejected { reason }) => {
                metrics::inc_chases("rejected");
                Err(chase_failed(reason))
            }
            Err(e) => {
                metrics::inc_chases("error");
                Err(chase_failed(e.to_string()))
            }
        }
    }

    async fn close(&self, pair: &HedgePair, state: PairState) -> Option<HedgePair> {
        self.risk.release_exposure(&pair.exposure);
        let removed = self.registry.remove(pair.id).await;
        info!(pair_id = pair.id, market = %pair.market_id, %state, "Hedge pair closed");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{Exposure, RiskLimits};
    use crate::trading::{MockSubmit, MockVenue};
    use rust_decimal_macros::dec;

    struct Harness {
        venue: MockVenue,
        risk: Arc<RiskManager>,
        registry: Arc<PairRegistry>,
        chaser: HedgeChaser,
    }

    fn harness() -> Harness {
        let config = Config::default();
        let venue = MockVenue::new();
        let risk = Arc::new(RiskManager::new(RiskLimits::from(&config)));
        let registry = Arc::new(PairRegistry::new());
        let chaser = HedgeChaser::new(
            Arc::new(venue.clone()),
            Arc::clone(&risk),
            Arc::clone(&registry),
            ChaseParams::from(&config),
        );
        Harness {
            venue,
            risk,
            registry,
            chaser,
        }
    }

    /// Submit both legs through the mock and register them as a pair.
    async fn open_pair(h: &Harness) -> (u64, String, String) {
        let mut ids = Vec::new();
        for (token, price, size) in [("yes", dec!(0.40), dec!(25)), ("no", dec!(0.55), dec!(18))] {
            let signed = h.venue.sign(&OrderSpec::buy(token, price, size)).await.unwrap();
            let id = h.venue.submit(&signed).await.unwrap().order_id().unwrap().to_string();
            ids.push(PairLeg {
                order_id: id,
                token_id: token.to_string(),
                size,
                price,
            });
        }
        h.risk.record("e1", "m1", dec!(20));
        let exposure = Exposure {
            event_id: "e1".to_string(),
            market_id: "m1".to_string(),
            amount: dec!(20),
        };
        let (b, a) = (ids.pop().unwrap(), ids.pop().unwrap());
        let (a_id, b_id) = (a.order_id.clone(), b.order_id.clone());
        let pair_id = h.registry.open("m1", a, b, exposure).await;
        (pair_id, a_id, b_id)
    }

    #[tokio::test(start_paused = true)]
    async fn filled_pair_is_removed_regardless_of_age() {
        let h = harness();
        let (pair_id, a, b) = open_pair(&h).await;
        h.venue.fill_all(&a);
        h.venue.fill_all(&b);

        let report = h.chaser.tick().await;

        assert_eq!(report.filled, vec![pair_id]);
        assert!(!report.closed[0].chased);
        assert!(h.registry.is_empty().await);
        assert_eq!(h.risk.status().open_trades, 0);
        assert_eq!(h.venue.submitted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn young_asymmetric_pair_waits() {
        let h = harness();
        let (_, a, _) = open_pair(&h).await;
        h.venue.fill_all(&a);

        tokio::time::advance(Duration::from_secs(60)).await;
        let report = h.chaser.tick().await;

        assert_eq!(report.open, 1);
        assert!(h.venue.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_c_timed_out_leg_is_chased() {
        let h = harness();
        let (pair_id, a, b) = open_pair(&h).await;
        h.venue.fill_all(&a);

        tokio::time::advance(Duration::from_secs(150)).await;
        let report = h.chaser.tick().await;

        assert_eq!(report.chased, vec![pair_id]);
        assert_eq!(report.closed.len(), 1);
        assert!(report.closed[0].chased);
        assert_eq!(h.venue.cancelled(), vec![b]);
        let chase = h.venue.submitted().pop().unwrap();
        assert_eq!(chase.token_id, "no");
        assert_eq!(chase.price, dec!(0.99));
        assert_eq!(chase.size, dec!(18));
        assert!(h.registry.is_empty().await);
        assert_eq!(h.risk.status().capital_locked, dec!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_fill_chases_only_the_remainder() {
        let h = harness();
        let (_, a, b) = open_pair(&h).await;
        h.venue.fill(&a, dec!(10));
        h.venue.fill_all(&b);

        tokio::time::advance(Duration::from_secs(121)).await;
        h.chaser.tick().await;

        let chase = h.venue.submitted().pop().unwrap();
        assert_eq!(chase.token_id, "yes");
        assert_eq!(chase.size, dec!(15));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_chase_retries_then_flags_stuck() {
        let h = harness();
        let (pair_id, a, _) = open_pair(&h).await;
        h.venue.fill_all(&a);
        h.venue.script(std::iter::repeat(MockSubmit::Reject("no liquidity".to_string())).take(5));
        tokio::time::advance(Duration::from_secs(150)).await;

        for _ in 0..5 {
            let report = h.chaser.tick().await;
            assert_eq!(report.chase_failures.len(), 1);
            assert_eq!(report.open, 1);
        }
        let chases_before = h.venue.submitted().len();

        let report = h.chaser.tick().await;
        assert_eq!(report.stuck, vec![pair_id]);
        assert!(report.chase_failures.is_empty());
        assert_eq!(h.venue.submitted().len(), chases_before);
        assert_eq!(h.risk.status().open_trades, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_chase_per_tick() {
        let h = harness();
        let (_, a, _) = open_pair(&h).await;
        h.venue.fill_all(&a);
        h.venue.script([MockSubmit::Reject("no".to_string())]);
        tokio::time::advance(Duration::from_secs(150)).await;

        h.chaser.tick().await;
        assert_eq!(h.venue.submitted().len(), 3);
        h.chaser.tick().await;
        assert_eq!(h.venue.submitted().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_pair_is_not_chased() {
        let h = harness();
        open_pair(&h).await;
        tokio::time::advance(Duration::from_secs(500)).await;

        let report = h.chaser.tick().await;

        assert_eq!(report.open, 1);
        assert_eq!(h.venue.submitted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn status_failure_keeps_pair_open() {
        let h = harness();
        let (_, a, b) = open_pair(&h).await;
        h.venue.fill_all(&a);
        h.venue.fill_all(&b);
        h.venue.fail_status(true);

        let report = h.chaser.tick().await;

        assert_eq!(report.open, 1);
        assert_eq!(h.registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let h = harness();
        let chaser = Arc::new(h.chaser);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(Arc::clone(&chaser).run(Duration::from_secs(10), rx));
        tokio::time::advance(Duration::from_secs(25)).await;
        tx.send(true).unwrap();

        task.await.unwrap();
    }
}
