//! Order placement.
//!
//! This module handles:
//! - Order specs and venue answers
//! - The [`OrderVenue`] seam with CLOB, dry-run, and scripted implementations

pub mod dry_run;
pub mod execution;
pub mod mock;
pub mod order;
pub mod venue;

pub use dry_run::DryRunVenue;
pub use execution::ClobVenue;
pub use mock::{MockCancel, MockSubmit, MockVenue};
pub use order::{CancelOutcome, FillStatus, OrderSpec, Side, SignedOrder, SubmitOutcome, TimeInForce};
pub use venue::OrderVenue;
