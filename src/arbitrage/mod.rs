//! Detection, execution, and reconciliation of hedge trades.
//!
//! This module handles:
//! - Strategy rules and position sizing
//! - Book fetching and opportunity detection
//! - Two-leg execution with rollback
//! - Timeout-driven chasing of one-sided fills
//! - The scan loop tying them together

pub mod calculator;
pub mod chaser;
pub mod detector;
pub mod executor;
pub mod pairs;
pub mod scanner;
pub mod sizer;

pub use calculator::{DetectionParams, Opportunity, OpportunityLeg, Strategy};
pub use chaser::{ChaseParams, HedgeChaser, TickReport};
pub use detector::OpportunityDetector;
pub use executor::{ExecutionReport, ExecutionResult, ExecutionState, OrderExecutor};
pub use pairs::{HedgePair, PairLeg, PairRegistry, PairState, UnhedgedAlert};
pub use scanner::{ScanReport, ScanSettings, Scanner};
pub use sizer::PositionSizer;
