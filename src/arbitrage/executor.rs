//! Two-leg hedge order execution with rollback.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use strum::Display;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use super::calculator::{Opportunity, OpportunityLeg};
use super::pairs::{PairLeg, PairRegistry, UnhedgedAlert};
use super::sizer::PositionSizer;
use crate::error::PipelineError;
use crate::metrics;
use crate::risk::{ExposureHold, RiskManager};
use crate::trading::{CancelOutcome, OrderSpec, OrderVenue, SubmitOutcome};

/// Step of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Nothing sent.
    NotStarted,
    /// Leg A accepted by the venue.
    LegASubmitted,
    /// Leg B accepted by the venue.
    LegBSubmitted,
    /// Pair registered.
    Open,
    /// Leg B rejected or errored.
    LegBFailed,
    /// Cancelling leg A.
    RollingBack,
    /// Leg A cancel acknowledged.
    RolledBack,
    /// Leg A cancel not confirmed.
    RollbackUncertain,
}

/// Result of attempting to execute an opportunity.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Both legs accepted and a hedge pair registered.
    Opened {
        /// Registry id of the new pair.
        pair_id: u64,
        /// Notional locked with the risk gate.
        notional: Decimal,
    },
    /// Not attempted; nothing sent and nothing locked.
    Skipped {
        /// Why the opportunity was passed over.
        reason: &'static str,
    },
    /// Attempt ended in a pipeline failure.
    Failed(PipelineError),
}

/// Outcome plus every state the attempt went through.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Final result.
    pub result: ExecutionResult,
    /// States in the order they were reached.
    pub trail: Vec<ExecutionState>,
}

impl ExecutionReport {
    /// Last state reached.
    pub fn final_state(&self) -> ExecutionState {
        self.trail.last().copied().unwrap_or(ExecutionState::NotStarted)
    }

    /// Whether the attempt opened a pair.
    pub fn is_opened(&self) -> bool {
        matches!(self.result, ExecutionResult::Opened { .. })
    }
}

struct Attempt {
    trail: Vec<ExecutionState>,
}

impl Attempt {
    fn new() -> Self {
        Self {
            trail: vec![ExecutionState::NotStarted],
        }
    }

    fn advance(&mut self, state: ExecutionState) {
        debug!(%state, "Execution state");
        self.trail.push(state);
    }

    fn finish(self, result: ExecutionResult) -> ExecutionReport {
        ExecutionReport {
            result,
            trail: self.trail,
        }
    }
}

/// Opens hedge pairs for executable opportunities.
pub struct OrderExecutor {
    risk: Arc<RiskManager>,
    venue: Arc<dyn OrderVenue>,
    registry: Arc<PairRegistry>,
    sizer: PositionSizer,
}

impl OrderExecutor {
    /// Create an executor.
    pub fn new(
        risk: Arc<RiskManager>,
        venue: Arc<dyn OrderVenue>,
        registry: Arc<PairRegistry>,
        sizer: PositionSizer,
    ) -> Self {
        Self {
            risk,
            venue,
            registry,
            sizer,
        }
    }

    /// Venue orders go to.
    pub fn venue_name(&self) -> &'static str {
        self.venue.name()
    }

    /// Execute the two legs of `opportunity`.
    ///
    /// Leg B is only sent once leg A is accepted. If leg B fails, leg A is
    /// cancelled; when that cancel is not confirmed the attempt ends in
    /// [`PipelineError::RollbackUncertain`] and the capital stays locked.
    #[instrument(skip(self, opportunity), fields(market = %opportunity.instrument.slug, strategy = %opportunity.strategy))]
    pub async fn execute(&self, opportunity: &Opportunity) -> ExecutionReport {
        let mut attempt = Attempt::new();

        if !opportunity.is_executable() {
            return attempt.finish(ExecutionResult::Skipped {
                reason: "not executable",
            });
        }

        let notional = opportunity.recommended_notional;
        if !self.sizer.meets_floor(notional) {
            info!(%notional, floor = %self.sizer.floor, "Below trade floor");
            return attempt.finish(ExecutionResult::Skipped {
                reason: "below trade floor",
            });
        }

        let (leg_a, leg_b) = (&opportunity.legs[0], &opportunity.legs[1]);
        let per_leg = notional / Decimal::TWO;
        let (Some(spec_a), Some(spec_b)) = (leg_order(leg_a, per_leg), leg_order(leg_b, per_leg)) else {
            info!(%notional, "Notional buys zero shares on a leg");
            return attempt.finish(ExecutionResult::Skipped { reason: "zero shares" });
        };

        let instrument = &opportunity.instrument;
        let hold = match self.risk.authorize_and_hold(&instrument.event_id, &instrument.id, notional) {
            Ok(hold) => hold,
            Err(reason) => {
                info!(%reason, %notional, "Risk gate refused trade");
                return attempt.finish(ExecutionResult::Failed(reason.into()));
            }
        };

        // Leg A: any failure aborts; leg B is never attempted.
        let order_a = match self.place(&spec_a).await {
            Ok(order_id) => order_id,
            Err(reason) => {
                warn!(token = %spec_a.token_id, %reason, "Leg A failed, aborting");
                return attempt.finish(ExecutionResult::Failed(PipelineError::OrderRejected { leg: 'A', reason }));
            }
        };
        attempt.advance(ExecutionState::LegASubmitted);

        match self.place(&spec_b).await {
            Ok(order_b) => {
                attempt.advance(ExecutionState::LegBSubmitted);
                let pair_id = self.open_pair(opportunity, hold, (order_a, spec_a), (order_b, spec_b)).await;
                attempt.advance(ExecutionState::Open);
                attempt.finish(ExecutionResult::Opened { pair_id, notional })
            }
            Err(reason) => {
                attempt.advance(ExecutionState::LegBFailed);
                warn!(token = %spec_b.token_id, %reason, order_a = %order_a, "Leg B failed, rolling back leg A");
                attempt.advance(ExecutionState::RollingBack);
                let result = self.roll_back(&mut attempt, opportunity, hold, &order_a, &spec_a, reason).await;
                attempt.finish(ExecutionResult::Failed(result))
            }
        }
    }

    async fn place(&self, spec: &OrderSpec) -> Result<String, String> {
        let signed = self.venue.sign(spec).await.map_err(|e| e.to_string())?;
        match self.venue.submit(&signed).await {
            Ok(SubmitOutcome::Accepted { order_id }) => {
                metrics::inc_legs_submitted();
                Ok(order_id)
            }
            Ok(SubmitOutcome::Rejected { reason }) => {
                metrics::inc_legs_rejected();
                Err(reason)
            }
            Err(e) => {
                metrics::inc_legs_rejected();
                Err(e.to_string())
            }
        }
    }

    async fn open_pair(
        &self,
        opportunity: &Opportunity,
        hold: ExposureHold,
        (order_a, spec_a): (String, OrderSpec),
        (order_b, spec_b): (String, OrderSpec),
    ) -> u64 {
        let exposure = hold.confirm();
        let pair_id = self
            .registry
            .open(
                &opportunity.instrument.id,
                pair_leg(order_a, spec_a),
                pair_leg(order_b, spec_b),
                exposure,
            )
            .await;
        metrics::inc_opportunities_executed();
        info!(pair_id, notional = %opportunity.recommended_notional, "Hedge pair opened");
        pair_id
    }

    async fn roll_back(
        &self,
        attempt: &mut Attempt,
        opportunity: &Opportunity,
        hold: ExposureHold,
        order_a: &str,
        spec_a: &OrderSpec,
        leg_b_reason: String,
    ) -> PipelineError {
        let cancel_failure = match self.venue.cancel(order_a).await {
            Ok(CancelOutcome::Acked) => None,
            Ok(CancelOutcome::Failed { reason }) => Some(reason),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = cancel_failure else {
            attempt.advance(ExecutionState::RolledBack);
            metrics::inc_rollbacks("acked");
            info!(order_a, "Leg A cancelled, attempt rolled back");
            drop(hold);
            return PipelineError::OrderRejected {
                leg: 'B',
                reason: leg_b_reason,
            };
        };

        attempt.advance(ExecutionState::RollbackUncertain);
        metrics::inc_rollbacks("uncertain");
        metrics::inc_unhedged_exposures();

        // Leg A may be live, so its capital stays counted.
        let exposure = hold.confirm();
        error!(
            event_type = "UNHEDGED_EXPOSURE",
            order_id = order_a,
            token = %spec_a.token_id,
            market = %opportunity.instrument.id,
            amount = %exposure.amount,
            %reason,
            "UNHEDGED EXPOSURE: leg A may be live without its hedge"
        );
        self.registry
            .raise_unhedged(UnhedgedAlert {
                order_id: order_a.to_string(),
                token_id: spec_a.token_id.clone(),
                market_id: exposure.market_id.clone(),
                amount: exposure.amount,
                reason: reason.clone(),
                raised_at: OffsetDateTime::now_utc(),
            })
            .await;

        PipelineError::RollbackUncertain {
            order_id: order_a.to_string(),
            reason,
        }
    }
}

/// GTC buy for one leg, or `None` if the notional buys no whole share.
fn leg_order(leg: &OpportunityLeg, notional: Decimal) -> Option<OrderSpec> {
    if leg.limit_price <= Decimal::ZERO {
        return None;
    }
    let shares = (notional / leg.limit_price).round_dp_with_strategy(0, RoundingStrategy::ToZero);
    (shares > Decimal::ZERO).then(|| OrderSpec::buy(&leg.token_id, leg.limit_price, shares))
}

fn pair_leg(order_id: String, spec: OrderSpec) -> PairLeg {
    PairLeg {
        order_id,
        token_id: spec.token_id,
        size: spec.size,
        price: spec.price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::calculator::Strategy;
    use crate::config::Config;
    use crate::error::RiskRejection;
    use crate::market::mock::binary_instrument;
    use crate::market::Venue;
    use crate::risk::RiskLimits;
    use crate::trading::{MockCancel, MockSubmit, MockVenue};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    struct Harness {
        venue: MockVenue,
        risk: Arc<RiskManager>,
        registry: Arc<PairRegistry>,
        executor: OrderExecutor,
    }

    fn harness() -> Harness {
        let config = Config::default();
        let venue = MockVenue::new();
        let risk = Arc::new(RiskManager::new(RiskLimits::from(&config)));
        let registry = Arc::new(PairRegistry::new());
        let executor = OrderExecutor::new(
            Arc::clone(&risk),
            Arc::new(venue.clone()),
            Arc::clone(&registry),
            PositionSizer::from(&config),
        );
        Harness {
            venue,
            risk,
            registry,
            executor,
        }
    }

    fn opportunity(notional: Decimal) -> Opportunity {
        let instrument = binary_instrument("m1", "e1", dec!(100000));
        let leg = |name: &str, token: &str, price| OpportunityLeg {
            venue: Venue::Polymarket,
            name: name.to_string(),
            token_id: token.to_string(),
            vwap: price,
            limit_price: price,
        };
        Opportunity {
            legs: vec![leg("Yes", "m1-yes", dec!(0.40)), leg("No", "m1-no", dec!(0.55))],
            instrument,
            strategy: Strategy::TakerBinary,
            total_cost: dec!(0.9595),
            profit_pct: dec!(4.05),
            recommended_notional: notional,
            detected_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn both_legs_accepted_opens_pair() {
        let h = harness();
        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert!(report.is_opened());
        assert_eq!(
            report.trail,
            vec![
                ExecutionState::NotStarted,
                ExecutionState::LegASubmitted,
                ExecutionState::LegBSubmitted,
                ExecutionState::Open
            ]
        );

        // $10 per leg: floor(10 / 0.40) = 25, floor(10 / 0.55) = 18
        let submitted = h.venue.submitted();
        assert_eq!(submitted[0].size, dec!(25));
        assert_eq!(submitted[1].size, dec!(18));
        assert_eq!(submitted[1].price, dec!(0.55));

        assert_eq!(h.risk.status().open_trades, 1);
        assert_eq!(h.risk.market_exposure("m1"), dec!(20));
        let pair = &h.registry.snapshot().await[0];
        assert!(!pair.chased);
        assert_eq!(pair.exposure.amount, dec!(20));
    }

    #[tokio::test]
    async fn leg_a_rejection_never_sends_leg_b() {
        let h = harness();
        h.venue.script([MockSubmit::Reject("not enough balance".to_string())]);

        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert!(matches!(
            report.result,
            ExecutionResult::Failed(PipelineError::OrderRejected { leg: 'A', .. })
        ));
        assert_eq!(report.final_state(), ExecutionState::NotStarted);
        assert_eq!(h.venue.submitted().len(), 1);
        assert!(h.venue.cancelled().is_empty());
        assert_eq!(h.risk.status().capital_locked, dec!(0));
    }

    #[tokio::test]
    async fn leg_a_transport_error_aborts() {
        let h = harness();
        h.venue.script([MockSubmit::Fail("connection refused".to_string())]);

        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert!(!report.trail.contains(&ExecutionState::LegBSubmitted));
        assert_eq!(h.venue.submitted().len(), 1);
        assert_eq!(h.risk.status().open_trades, 0);
    }

    #[tokio::test]
    async fn leg_b_rejection_cancels_leg_a() {
        let h = harness();
        h.venue.script([MockSubmit::Accept, MockSubmit::Reject("price moved".to_string())]);

        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert_eq!(report.final_state(), ExecutionState::RolledBack);
        assert!(matches!(
            report.result,
            ExecutionResult::Failed(PipelineError::OrderRejected { leg: 'B', .. })
        ));
        assert_eq!(h.venue.cancelled(), vec!["mock-1".to_string()]);
        assert_eq!(h.risk.status().capital_locked, dec!(0));
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn failed_cancel_surfaces_unhedged_exposure() {
        let h = harness();
        h.venue.script([MockSubmit::Accept, MockSubmit::Fail("timeout".to_string())]);
        h.venue.set_cancel(MockCancel::Fail);

        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert_eq!(report.final_state(), ExecutionState::RollbackUncertain);
        match report.result {
            ExecutionResult::Failed(e) => assert!(e.is_escalation()),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(h.venue.cancelled().len(), 1);
        assert_eq!(h.risk.status().capital_locked, dec!(20));
        let alerts = h.registry.unhedged().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].order_id, "mock-1");
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn cancel_transport_error_is_also_uncertain() {
        let h = harness();
        h.venue.script([MockSubmit::Accept, MockSubmit::Reject("no".to_string())]);
        h.venue.set_cancel(MockCancel::Error);

        let report = h.executor.execute(&opportunity(dec!(20))).await;
        assert_eq!(report.final_state(), ExecutionState::RollbackUncertain);
    }

    #[tokio::test]
    async fn risk_rejection_sends_nothing() {
        let h = harness();
        for i in 0..4 {
            h.risk.record("other", &format!("m{i}x"), dec!(1));
        }

        let report = h.executor.execute(&opportunity(dec!(20))).await;

        assert!(matches!(
            report.result,
            ExecutionResult::Failed(PipelineError::RiskRejected(RiskRejection::MaxOpenTrades { .. }))
        ));
        assert!(h.venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn small_or_reported_only_opportunities_are_skipped() {
        let h = harness();

        let below_floor = h.executor.execute(&opportunity(dec!(4))).await;
        assert!(matches!(
            below_floor.result,
            ExecutionResult::Skipped {
                reason: "below trade floor"
            }
        ));

        let mut cross = opportunity(dec!(20));
        cross.strategy = Strategy::CrossVenue;
        let skipped = h.executor.execute(&cross).await;
        assert!(matches!(skipped.result, ExecutionResult::Skipped { .. }));
        assert!(h.venue.submitted().is_empty());
    }

    #[test]
    fn leg_share_count_rounds_down() {
        let leg = OpportunityLeg {
            venue: Venue::Polymarket,
            name: "Yes".to_string(),
            token_id: "t".to_string(),
            vwap: dec!(0.30),
            limit_price: dec!(0.30),
        };
        assert_eq!(leg_order(&leg, dec!(10)).unwrap().size, dec!(33));
        assert!(leg_order(&leg, dec!(0.2)).is_none());
    }
}
