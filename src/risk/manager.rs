//! Stateful exposure gate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RiskRejection;
use crate::metrics;

/// Configured exposure ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskLimits {
    /// Total capital available to lock.
    pub starting_bankroll: Decimal,
    /// Ceiling per market.
    pub max_exposure_per_market: Decimal,
    /// Ceiling per event (correlated markets).
    pub max_event_exposure: Decimal,
    /// Ceiling on concurrently open trades.
    pub max_open_trades: u32,
}

impl From<&Config> for RiskLimits {
    fn from(config: &Config) -> Self {
        Self {
            starting_bankroll: config.starting_bankroll_usd,
            max_exposure_per_market: config.max_exposure_per_market_usd,
            max_event_exposure: config.max_event_exposure_usd,
            max_open_trades: config.max_total_open_trades,
        }
    }
}

/// Locked capital by market and event.
#[derive(Debug, Clone, Default)]
pub struct ExposureState {
    market_exposure: HashMap<String, Decimal>,
    event_exposure: HashMap<String, Decimal>,
    total_locked: Decimal,
    open_trades: u32,
}

impl ExposureState {
    fn market(&self, market_id: &str) -> Decimal {
        self.market_exposure.get(market_id).copied().unwrap_or_default()
    }

    fn event(&self, event_id: &str) -> Decimal {
        self.event_exposure.get(event_id).copied().unwrap_or_default()
    }

    fn check(
        &self,
        limits: &RiskLimits,
        event_id: &str,
        market_id: &str,
        amount: Decimal,
    ) -> Result<(), RiskRejection> {
        if self.open_trades >= limits.max_open_trades {
            return Err(RiskRejection::MaxOpenTrades {
                limit: limits.max_open_trades,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(RiskRejection::InvalidAmount(amount));
        }
        if self.total_locked + amount > limits.starting_bankroll {
            return Err(RiskRejection::InsufficientCapital {
                requested: amount,
                remaining: limits.starting_bankroll - self.total_locked,
            });
        }
        if self.market(market_id) + amount > limits.max_exposure_per_market {
            return Err(RiskRejection::MarketExposure {
                market_id: market_id.to_string(),
            });
        }
        if self.event(event_id) + amount > limits.max_event_exposure {
            return Err(RiskRejection::EventExposure {
                event_id: event_id.to_string(),
            });
        }
        Ok(())
    }

    fn add(&mut self, event_id: &str, market_id: &str, amount: Decimal) {
        *self.market_exposure.entry(market_id.to_string()).or_default() += amount;
        *self.event_exposure.entry(event_id.to_string()).or_default() += amount;
        self.total_locked += amount;
        self.open_trades += 1;
    }

    fn subtract(&mut self, event_id: &str, market_id: &str, amount: Decimal) {
        fn floor_sub(map: &mut HashMap<String, Decimal>, key: &str, amount: Decimal) {
            if let Some(value) = map.get_mut(key) {
                *value = (*value - amount).max(Decimal::ZERO);
                if value.is_zero() {
                    map.remove(key);
                }
            }
        }

        floor_sub(&mut self.market_exposure, market_id, amount);
        floor_sub(&mut self.event_exposure, event_id, amount);
        self.total_locked = (self.total_locked - amount).max(Decimal::ZERO);
        self.open_trades = self.open_trades.saturating_sub(1);
    }
}

/// Snapshot of the gate for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskStatus {
    /// Trades currently open.
    pub open_trades: u32,
    /// Capital locked by open trades.
    pub capital_locked: Decimal,
    /// Bankroll minus locked capital.
    pub remaining_capital: Decimal,
}

/// Capital locked for one opened trade, released when the trade closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    /// Event the capital counts against.
    pub event_id: String,
    /// Market the capital counts against.
    pub market_id: String,
    /// Locked USD.
    pub amount: Decimal,
}

/// Gatekeeper over [`ExposureState`].
///
/// All reads and writes go through one lock, so a check and the write that
/// follows it cannot interleave with another caller.
#[derive(Debug)]
pub struct RiskManager {
    limits: RiskLimits,
    state: Mutex<ExposureState>,
}

impl RiskManager {
    /// Create a gate with empty exposure.
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(ExposureState::default()),
        }
    }

    /// Create a gate from config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(RiskLimits::from(config))
    }

    /// Configured limits.
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Check a request against every cap without changing state.
    ///
    /// Checks run in a fixed order (open trades, capital, market, event) and
    /// the first failure is returned.
    pub fn authorize(&self, event_id: &str, market_id: &str, amount: Decimal) -> Result<(), RiskRejection> {
        let result = self.state.lock().check(&self.limits, event_id, market_id, amount);
        if let Err(reason) = &result {
            metrics::inc_risk_rejections(reason.label());
            debug!(%event_id, %market_id, %amount, %reason, "Risk gate rejected request");
        }
        result
    }

    /// Lock capital for an opened trade.
    pub fn record(&self, event_id: &str, market_id: &str, amount: Decimal) {
        let mut state = self.state.lock();
        state.add(event_id, market_id, amount);
        info!(%event_id, %market_id, %amount, open_trades = state.open_trades, "Exposure recorded");
        metrics::set_capital_locked(state.total_locked.to_f64().unwrap_or_default());
    }

    /// Unlock capital for a closed trade. Totals never go below zero.
    pub fn release(&self, event_id: &str, market_id: &str, amount: Decimal) {
        let mut state = self.state.lock();
        if state.market(market_id) < amount {
            warn!(%market_id, %amount, locked = %state.market(market_id), "Releasing more than locked");
        }
        state.subtract(event_id, market_id, amount);
        info!(%event_id, %market_id, %amount, open_trades = state.open_trades, "Exposure released");
        metrics::set_capital_locked(state.total_locked.to_f64().unwrap_or_default());
    }

    /// Release a previously confirmed [`Exposure`].
    pub fn release_exposure(&self, exposure: &Exposure) {
        self.release(&exposure.event_id, &exposure.market_id, exposure.amount);
    }

    /// Authorize and reserve in one step.
    ///
    /// The returned hold counts against every cap immediately. Dropping it
    /// without [`ExposureHold::confirm`] gives the capital back.
    pub fn authorize_and_hold(
        self: &Arc<Self>,
        event_id: &str,
        market_id: &str,
        amount: Decimal,
    ) -> Result<ExposureHold, RiskRejection> {
        {
            let mut state = self.state.lock();
            if let Err(reason) = state.check(&self.limits, event_id, market_id, amount) {
                drop(state);
                metrics::inc_risk_rejections(reason.label());
                debug!(%event_id, %market_id, %amount, %reason, "Risk gate rejected request");
                return Err(reason);
            }
            state.add(event_id, market_id, amount);
        }

        Ok(ExposureHold {
            risk: Arc::clone(self),
            exposure: Some(Exposure {
                event_id: event_id.to_string(),
                market_id: market_id.to_string(),
                amount,
            }),
        })
    }

    /// Current open trades and capital.
    pub fn status(&self) -> RiskStatus {
        let state = self.state.lock();
        RiskStatus {
            open_trades: state.open_trades,
            capital_locked: state.total_locked,
            remaining_capital: self.limits.starting_bankroll - state.total_locked,
        }
    }

    /// Capital locked in one market.
    pub fn market_exposure(&self, market_id: &str) -> Decimal {
        self.state.lock().market(market_id)
    }

    /// Capital locked in one event.
    pub fn event_exposure(&self, event_id: &str) -> Decimal {
        self.state.lock().event(event_id)
    }
}

/// Reserved exposure awaiting the outcome of an order attempt.
#[derive(Debug)]
pub struct ExposureHold {
    risk: Arc<RiskManager>,
    exposure: Option<Exposure>,
}

impl ExposureHold {
    /// Held amount.
    pub fn amount(&self) -> Decimal {
        self.exposure.as_ref().map(|e| e.amount).unwrap_or_default()
    }

    /// Keep the capital locked; the caller now owns its release.
    pub fn confirm(mut self) -> Exposure {
        // Always Some until confirm or drop consumes it.
        self.exposure.take().unwrap_or_else(|| Exposure {
            event_id: String::new(),
            market_id: String::new(),
            amount: Decimal::ZERO,
        })
    }
}

impl Drop for ExposureHold {
    fn drop(&mut self) {
        if let Some(exposure) = self.exposure.take() {
            self.risk.release_exposure(&exposure);
        }
    }
}
