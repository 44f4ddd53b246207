//! Unified error types for the hedge engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the hedge engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market data error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Book pricing error.
    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Pipeline failure from detection through recovery.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market listing and book fetch errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Failed to fetch market information.
    #[error("failed to fetch {id}: {reason}")]
    FetchFailed {
        /// Market, token, or endpoint that failed.
        id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Rate limited by the data provider.
    #[error("rate limited by market data provider")]
    RateLimited,

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Fill pricing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Target notional was zero or negative.
    #[error("invalid target notional: {0}")]
    InvalidNotional(Decimal),

    /// The book cannot absorb the requested notional.
    #[error("insufficient depth: need ${required}, book holds ${available}")]
    InsufficientDepth {
        /// Requested notional.
        required: Decimal,
        /// Total notional on the side.
        available: Decimal,
    },
}

/// Reason the risk gate refused a sizing request.
///
/// Exactly one variant is produced per refusal, matching the first check
/// that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    /// Open trade count is at its ceiling.
    #[error("max open trades ({limit}) reached")]
    MaxOpenTrades {
        /// Configured limit.
        limit: u32,
    },

    /// Bankroll cannot cover the request.
    #[error("insufficient capital: requested ${requested}, remaining ${remaining}")]
    InsufficientCapital {
        /// Requested amount.
        requested: Decimal,
        /// Unlocked bankroll.
        remaining: Decimal,
    },

    /// The market already holds too much capital.
    #[error("market exposure limit exceeded for {market_id}")]
    MarketExposure {
        /// Market identifier.
        market_id: String,
    },

    /// The event already holds too much capital.
    #[error("event correlation limit exceeded for {event_id}")]
    EventExposure {
        /// Event identifier.
        event_id: String,
    },

    /// Requested amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
}

impl RiskRejection {
    /// Stable short label, used as a metric tag.
    pub fn label(&self) -> &'static str {
        match self {
            RiskRejection::MaxOpenTrades { .. } => "max_open_trades",
            RiskRejection::InsufficientCapital { .. } => "insufficient_capital",
            RiskRejection::MarketExposure { .. } => "market_exposure",
            RiskRejection::EventExposure { .. } => "event_exposure",
            RiskRejection::InvalidAmount(_) => "invalid_amount",
        }
    }
}

/// Failure taxonomy for the scan, execution, and reconciliation pipeline.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// No fresh book could be obtained; the instrument is skipped this cycle.
    #[error("no fresh book for {token_id}")]
    DataUnavailable {
        /// Leg token that could not be priced.
        token_id: String,
    },

    /// Book too thin to price the target notional.
    #[error("insufficient depth on {token_id}: {source}")]
    InsufficientDepth {
        /// Leg token that ran out of depth.
        token_id: String,
        /// Pricing failure.
        source: PricingError,
    },

    /// The risk gate refused the trade.
    #[error("risk rejected: {0}")]
    RiskRejected(#[from] RiskRejection),

    /// The venue declined a leg.
    #[error("leg {leg} rejected: {reason}")]
    OrderRejected {
        /// Leg label (A or B).
        leg: char,
        /// Venue reason.
        reason: String,
    },

    /// Leg B failed and the cancel of leg A was not confirmed.
    #[error("UNHEDGED EXPOSURE: cancel of order {order_id} unconfirmed: {reason}")]
    RollbackUncertain {
        /// Order that may still be live.
        order_id: String,
        /// Cancel failure detail.
        reason: String,
    },

    /// The aggressive close order was rejected.
    #[error("chase failed for pair {pair_id}: {reason}")]
    ChaseFailed {
        /// Hedge pair identifier.
        pair_id: u64,
        /// Venue reason.
        reason: String,
    },
}

impl PipelineError {
    /// Whether the failure must be surfaced rather than recovered locally.
    pub fn is_escalation(&self) -> bool {
        matches!(self, PipelineError::RollbackUncertain { .. })
    }
}

/// Trading and order execution errors.
#[derive(Error, Debug, Clone)]
pub enum TradingError {
    /// Order submission failed in transport.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Signing error.
    #[error("signing error: {0}")]
    SigningError(String),

    /// Rate limited by the API.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// Order rejected by the exchange.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn only_uncertain_rollback_escalates() {
        let uncertain = PipelineError::RollbackUncertain {
            order_id: "a-1".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(uncertain.is_escalation());
        assert!(uncertain.to_string().contains("UNHEDGED EXPOSURE"));

        let others = [
            PipelineError::DataUnavailable {
                token_id: "t".to_string(),
            },
            PipelineError::RiskRejected(RiskRejection::MaxOpenTrades { limit: 4 }),
            PipelineError::OrderRejected {
                leg: 'A',
                reason: "no".to_string(),
            },
            PipelineError::ChaseFailed {
                pair_id: 1,
                reason: "no".to_string(),
            },
            PipelineError::InsufficientDepth {
                token_id: "t".to_string(),
                source: PricingError::InsufficientDepth {
                    required: dec!(10),
                    available: dec!(1),
                },
            },
        ];
        assert!(others.iter().all(|e| !e.is_escalation()));
    }

    #[test]
    fn risk_rejection_reasons_are_readable() {
        let reason = RiskRejection::MaxOpenTrades { limit: 4 }.to_string();
        assert!(reason.starts_with("max open trades"));
    }
}
