//! Risk gate: exposure caps, holds, and status.

pub mod manager;

pub use manager::{Exposure, ExposureHold, ExposureState, RiskLimits, RiskManager, RiskStatus};
