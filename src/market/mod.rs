//! Market module for prediction-market instruments.
//!
//! This module handles:
//! - Instrument and venue listing types
//! - The market data provider abstraction
//! - Polymarket and Kalshi clients
//! - Discovery and cross-venue pairing
//! - Mock provider for testing

pub mod client;
pub mod discovery;
pub mod kalshi;
pub mod mock;
pub mod provider;
pub mod types;

pub use client::PolymarketClient;
pub use discovery::{instrument_from_gamma, pair_cross_venue};
pub use kalshi::KalshiClient;
pub use mock::{MockMarketData, MockOrderBookBuilder};
pub use provider::{MarketDataProvider, MarketFilter, Venue};
pub use types::{Instrument, Leg, Outcome};
