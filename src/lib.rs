//! Prediction-market hedge arbitrage engine.
//!
//! Scans order books for spreads where buying every outcome of a market costs
//! less than the $1.00 payout, sizes trades against a session risk budget, and
//! opens two-leg ("hedge") limit orders. When only one leg fills, a periodic
//! chaser closes the gap with an aggressive order after a timeout.
//!
//! ```text
//! YES ask:  $0.40
//! NO ask:   $0.55
//! ───────────────────────
//! Cost:     0.95 x 1.01 (fees) = 0.9595 < 0.99
//! Profit:   4.05%
//! ```
//!
//! # Pipeline
//!
//! MarketDataCache → fill pricing → OpportunityDetector → PositionSizer →
//! RiskManager → OrderExecutor → HedgeChaser → RiskManager (release).
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types and the pipeline failure taxonomy
//! - [`market`]: Market discovery and venue data providers
//! - [`orderbook`]: Book types, fill pricing, cache, and WebSocket feed
//! - [`arbitrage`]: Detection, sizing, execution, and chasing
//! - [`risk`]: Exposure caps
//! - [`trading`]: Order types and order venues
//! - [`signing`]: Order signing and request authentication
//! - [`metrics`]: Prometheus metrics
//! - [`api`]: HTTP API for health/status/metrics
//! - [`utils`]: Retry policy and shutdown handling

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod risk;
pub mod signing;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
