//! Prometheus metrics for the scan, execution, and reconciliation pipeline.
//!
//! This module provides:
//! - Book fetch and WebSocket processing latency
//! - Detection, risk, and order counters
//! - Rollback, unhedged-exposure, and chase tracking
//! - The Prometheus recorder used by the `/metrics` route

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Scan cycle latency metric name.
pub const METRIC_SCAN_CYCLE_LATENCY: &str = "scan_cycle_latency_ms";
/// Signing latency metric name.
pub const METRIC_SIGNING_LATENCY: &str = "signing_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";
/// Cache hits counter metric name.
pub const METRIC_CACHE_HITS: &str = "book_cache_hits_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Opportunities executed counter metric name.
pub const METRIC_OPPORTUNITIES_EXECUTED: &str = "opportunities_executed_total";
/// Risk rejections counter metric name.
pub const METRIC_RISK_REJECTIONS: &str = "risk_rejections_total";
/// Legs submitted counter metric name.
pub const METRIC_LEGS_SUBMITTED: &str = "legs_submitted_total";
/// Legs rejected counter metric name.
pub const METRIC_LEGS_REJECTED: &str = "legs_rejected_total";
/// Rollbacks counter metric name.
pub const METRIC_ROLLBACKS: &str = "rollbacks_total";
/// Unhedged exposure counter metric name.
pub const METRIC_UNHEDGED_EXPOSURES: &str = "unhedged_exposures_total";
/// Chase submissions counter metric name.
pub const METRIC_CHASES: &str = "chases_total";
/// Pairs filled counter metric name.
pub const METRIC_PAIRS_FILLED: &str = "pairs_filled_total";
/// Open pairs gauge metric name.
pub const METRIC_OPEN_PAIRS: &str = "open_pairs";
/// Locked capital gauge metric name.
pub const METRIC_CAPITAL_LOCKED: &str = "capital_locked_usd";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";

/// Install the Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(METRIC_ORDER_SUBMIT_LATENCY, "Order submission latency in milliseconds");
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(METRIC_SCAN_CYCLE_LATENCY, "Full scan cycle latency in milliseconds");
    describe_histogram!(METRIC_SIGNING_LATENCY, "Order signing latency in milliseconds");
    describe_histogram!(METRIC_ORDERBOOK_FETCH_LATENCY, "Order book fetch latency in milliseconds");

    describe_counter!(METRIC_CACHE_HITS, "Book reads served from a fresh cache entry");
    describe_counter!(METRIC_OPPORTUNITIES_DETECTED, "Opportunities detected, by strategy");
    describe_counter!(METRIC_OPPORTUNITIES_EXECUTED, "Opportunities opened as hedge pairs");
    describe_counter!(METRIC_RISK_REJECTIONS, "Risk gate refusals, by reason");
    describe_counter!(METRIC_LEGS_SUBMITTED, "Order legs accepted by the venue");
    describe_counter!(METRIC_LEGS_REJECTED, "Order legs rejected by the venue");
    describe_counter!(METRIC_ROLLBACKS, "Leg-A cancels after a leg-B failure, by result");
    describe_counter!(METRIC_UNHEDGED_EXPOSURES, "Uncertain rollbacks leaving a leg unhedged");
    describe_counter!(METRIC_CHASES, "Chase orders submitted, by result");
    describe_counter!(METRIC_PAIRS_FILLED, "Hedge pairs with both legs filled");
    describe_counter!(METRIC_WS_MESSAGES_RECEIVED, "Total number of WebSocket messages received");
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of WebSocket reconnections");

    describe_gauge!(METRIC_OPEN_PAIRS, "Hedge pairs currently OPEN");
    describe_gauge!(METRIC_CAPITAL_LOCKED, "Capital locked by open trades in USD");

    debug!("Metrics initialized");
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Record order submission latency.
pub fn record_order_submit_latency(start: Instant) {
    histogram!(METRIC_ORDER_SUBMIT_LATENCY).record(elapsed_ms(start));
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(elapsed_ms(start));
}

/// Record signing operation latency.
pub fn record_signing_latency(start: Instant) {
    histogram!(METRIC_SIGNING_LATENCY).record(elapsed_ms(start));
}

/// Record order book fetch latency.
pub fn record_orderbook_fetch_latency(start: Instant, venue: &str) {
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY, "venue" => venue.to_string()).record(elapsed_ms(start));
}

/// Increment cache hits counter.
pub fn inc_cache_hits() {
    counter!(METRIC_CACHE_HITS).increment(1);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected(strategy: &str) {
    counter!(METRIC_OPPORTUNITIES_DETECTED, "strategy" => strategy.to_string()).increment(1);
}

/// Increment opportunities executed counter.
pub fn inc_opportunities_executed() {
    counter!(METRIC_OPPORTUNITIES_EXECUTED).increment(1);
}

/// Increment risk rejections counter.
pub fn inc_risk_rejections(reason: &'static str) {
    counter!(METRIC_RISK_REJECTIONS, "reason" => reason).increment(1);
}

/// Increment legs submitted counter.
pub fn inc_legs_submitted() {
    counter!(METRIC_LEGS_SUBMITTED).increment(1);
}

/// Increment legs rejected counter.
pub fn inc_legs_rejected() {
    counter!(METRIC_LEGS_REJECTED).increment(1);
}

/// Increment rollbacks counter.
pub fn inc_rollbacks(result: &'static str) {
    counter!(METRIC_ROLLBACKS, "result" => result).increment(1);
}

/// Increment unhedged exposure counter.
pub fn inc_unhedged_exposures() {
    counter!(METRIC_UNHEDGED_EXPOSURES).increment(1);
}

/// Increment chases counter.
pub fn inc_chases(result: &'static str) {
    counter!(METRIC_CHASES, "result" => result).increment(1);
}

/// Increment pairs filled counter.
pub fn inc_pairs_filled() {
    counter!(METRIC_PAIRS_FILLED).increment(1);
}

/// Set the open pairs gauge.
pub fn set_open_pairs(count: usize) {
    gauge!(METRIC_OPEN_PAIRS).set(count as f64);
}

/// Set the locked capital gauge.
pub fn set_capital_locked(usd: f64) {
    gauge!(METRIC_CAPITAL_LOCKED).set(usd);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        elapsed_ms(self.start)
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(elapsed_ms(self.start));
    }
}

/// Times a scan cycle until dropped.
pub fn timer_scan_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_CYCLE_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        inc_risk_rejections("max_open_trades");
        inc_chases("accepted");
        set_open_pairs(3);
    }
}
