//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::arbitrage::{PairRegistry, UnhedgedAlert};
use crate::risk::{RiskManager, RiskStatus};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the first scan cycle has completed.
    pub ready: Arc<AtomicBool>,
    /// Whether orders go to the live venue.
    pub live_trading: bool,
    /// Risk gate.
    pub risk: Arc<RiskManager>,
    /// Open pairs and unhedged alerts.
    pub registry: Arc<PairRegistry>,
    /// Prometheus render handle, when metrics are enabled.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(risk: Arc<RiskManager>, registry: Arc<PairRegistry>, live_trading: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            live_trading,
            risk,
            registry,
            prometheus: None,
        }
    }

    /// Serve `/metrics` from this handle.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// "live" or "dry_run".
    pub mode: &'static str,
    /// Risk gate snapshot.
    pub risk: RiskStatus,
    /// Hedge pairs currently OPEN.
    pub open_pairs: usize,
    /// OPEN pairs that gave up chasing.
    pub stuck_pairs: usize,
    /// Outstanding unhedged exposure.
    pub unhedged: Vec<UnhedgedAlert>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(ReadyResponse { ready }))
}

/// Status handler - risk snapshot, open pairs, and unhedged alerts.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let unhedged = state.registry.unhedged().await;
    let status = match (state.is_ready(), unhedged.is_empty()) {
        (_, false) => "unhedged",
        (true, true) => "running",
        (false, true) => "starting",
    };

    Json(StatusResponse {
        status,
        mode: if state.live_trading { "live" } else { "dry_run" },
        risk: state.risk.status(),
        open_pairs: state.registry.len().await,
        stuck_pairs: state.registry.stuck_count().await,
        unhedged,
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string()),
    }
}
