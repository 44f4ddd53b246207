//! Polymarket CLOB order venue over HTTP.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::order::{CancelOutcome, FillStatus, OrderSpec, SignedOrder, SubmitOutcome};
use super::venue::OrderVenue;
use crate::config::Config;
use crate::error::TradingError;
use crate::metrics;
use crate::signing::{self, WalletKind};
use crate::utils::retry::RetryPolicy;

/// Zero address used as the open taker.
const OPEN_TAKER: &str = "0x0000000000000000000000000000000000000000";

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Token ID to trade.
    pub token_id: String,
    /// Order side (BUY/SELL).
    pub side: String,
    /// Limit price.
    pub price: String,
    /// Order size.
    pub size: String,
    /// Fee rate basis points.
    pub fee_rate_bps: String,
    /// Nonce for order uniqueness.
    pub nonce: String,
    /// Expiration timestamp.
    pub expiration: String,
    /// Taker address.
    pub taker: String,
    /// Maker address.
    pub maker: String,
    /// Signature type.
    pub signature_type: u8,
    /// Order signature.
    pub signature: String,
    /// Time in force.
    pub order_type: String,
    /// Funder address for proxy wallets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funder: Option<String>,
}

/// Order submission result.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResult {
    /// Order ID (various field names).
    #[serde(alias = "orderID", alias = "orderId", alias = "order_id", alias = "id")]
    pub order_id: Option<String>,
    /// Error message if any.
    #[serde(alias = "errorMsg")]
    pub error: Option<String>,
    /// Success flag.
    pub success: Option<bool>,
}

/// Authenticated CLOB venue.
#[derive(Debug, Clone)]
pub struct ClobVenue {
    http: reqwest::Client,
    clob_url: String,
    private_key: String,
    signature_type: u8,
    funder: Option<String>,
    retry: RetryPolicy,
}

impl ClobVenue {
    /// Create a venue around the shared HTTP client.
    ///
    /// Fails when the configured private key cannot produce a signer.
    pub fn new(http: reqwest::Client, config: &Config) -> Result<Self, TradingError> {
        let address = signing::address_from_private_key(&config.polymarket_private_key)?;
        info!(
            address = %address,
            wallet = %WalletKind::from_u8(config.polymarket_signature_type),
            "CLOB venue ready"
        );

        Ok(Self {
            http,
            clob_url: config.polymarket_clob_url.trim_end_matches('/').to_string(),
            private_key: config.polymarket_private_key.clone(),
            signature_type: config.polymarket_signature_type,
            funder: config.polymarket_funder.clone(),
            retry: config.retry_policy(),
        })
    }

    fn request_body(&self, order: &SignedOrder) -> OrderRequest {
        OrderRequest {
            token_id: order.spec.token_id.clone(),
            side: order.spec.side.to_string(),
            price: order.spec.price.to_string(),
            size: order.spec.size.to_string(),
            fee_rate_bps: "0".to_string(),
            nonce: order.nonce.clone(),
            expiration: order.expiration.to_string(),
            taker: OPEN_TAKER.to_string(),
            maker: order.maker.clone(),
            signature_type: self.signature_type,
            signature: order.signature.clone(),
            order_type: order.spec.tif.to_string(),
            funder: self.funder.clone(),
        }
    }

    async fn authed(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, TradingError> {
        let headers = signing::auth_headers(&self.private_key).await?;
        Ok(headers
            .into_iter()
            .fold(builder, |req, (key, value)| req.header(key, value)))
    }

    async fn submit_once(&self, body: &OrderRequest) -> Result<SubmitOutcome, TradingError> {
        let url = format!("{}/order", self.clob_url);
        let response = self
            .authed(self.http.post(&url).json(body))
            .await?
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TradingError::RateLimited {
                retry_after_seconds: retry_after(&response).unwrap_or(self.retry.rate_limit_backoff.as_secs()),
            });
        }
        if status.is_server_error() {
            return Err(TradingError::SubmissionFailed(format!("HTTP {}", status)));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Ok(SubmitOutcome::Rejected {
                reason: format!("HTTP {} - {}", status, body),
            });
        }

        let result: SubmitResult = response
            .json()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("Failed to parse response: {}", e)))?;

        Ok(classify_submit(result))
    }

    async fn cancel_once(&self, order_id: &str) -> Result<CancelOutcome, TradingError> {
        let url = format!("{}/order/{}", self.clob_url, order_id);
        let response = self
            .authed(self.http.delete(&url))
            .await?
            .send()
            .await
            .map_err(|e| TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TradingError::RateLimited {
                retry_after_seconds: retry_after(&response).unwrap_or(self.retry.rate_limit_backoff.as_secs()),
            });
        }
        if status.is_success() {
            return Ok(CancelOutcome::Acked);
        }
        Err(TradingError::CancelFailed {
            order_id: order_id.to_string(),
            reason: format!("HTTP {}", status),
        })
    }

    async fn status_once(&self, order_id: &str) -> Result<FillStatus, TradingError> {
        let url = format!("{}/data/order/{}", self.clob_url, order_id);
        let status_err = |reason: String| TradingError::StatusFailed {
            order_id: order_id.to_string(),
            reason,
        };

        let response = self
            .authed(self.http.get(&url))
            .await?
            .send()
            .await
            .map_err(|e| status_err(format!("HTTP request failed: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TradingError::RateLimited {
                retry_after_seconds: retry_after(&response).unwrap_or(self.retry.rate_limit_backoff.as_secs()),
            });
        }
        if !response.status().is_success() {
            return Err(status_err(format!("HTTP {}", response.status())));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| status_err(format!("Failed to parse response: {}", e)))?;

        parse_fill_status(&json).ok_or_else(|| status_err("missing size fields".to_string()))
    }
}

#[async_trait]
impl OrderVenue for ClobVenue {
    fn name(&self) -> &'static str {
        "clob"
    }

    async fn sign(&self, spec: &OrderSpec) -> Result<SignedOrder, TradingError> {
        signing::sign_order(&self.private_key, spec).await
    }

    #[instrument(skip(self, order), fields(token = %order.spec.token_id, price = %order.spec.price, size = %order.spec.size))]
    async fn submit(&self, order: &SignedOrder) -> Result<SubmitOutcome, TradingError> {
        let body = self.request_body(order);
        let start = Instant::now();
        let outcome = self.retry.run("submit_order", || self.submit_once(&body)).await;
        metrics::record_order_submit_latency(start);

        match &outcome {
            Ok(SubmitOutcome::Accepted { order_id }) => info!(order_id = %order_id, "Order accepted"),
            Ok(SubmitOutcome::Rejected { reason }) => warn!(reason = %reason, "Order rejected"),
            Err(e) => warn!(error = %e, "Order submission failed"),
        }
        outcome
    }

    #[instrument(skip(self))]
    async fn cancel(&self, order_id: &str) -> Result<CancelOutcome, TradingError> {
        match self.retry.run("cancel_order", || self.cancel_once(order_id)).await {
            Ok(outcome) => {
                info!("Order cancelled");
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Cancel not confirmed");
                Ok(CancelOutcome::Failed { reason: e.to_string() })
            }
        }
    }

    #[instrument(skip(self))]
    async fn status(&self, order_id: &str) -> Result<FillStatus, TradingError> {
        let status = self.retry.run("order_status", || self.status_once(order_id)).await?;
        debug!(matched = %status.matched_size, original = %status.original_size, "Order status");
        Ok(status)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Map a 2xx submission body to a venue decision.
pub fn classify_submit(result: SubmitResult) -> SubmitOutcome {
    match (result.order_id.filter(|id| !id.is_empty()), result.error.filter(|e| !e.is_empty())) {
        (_, Some(error)) => SubmitOutcome::Rejected { reason: error },
        (Some(order_id), None) if result.success != Some(false) => SubmitOutcome::Accepted { order_id },
        _ => SubmitOutcome::Rejected {
            reason: "No order ID in response".to_string(),
        },
    }
}

/// Parse matched and original size from an order status body.
pub fn parse_fill_status(json: &serde_json::Value) -> Option<FillStatus> {
    let original_size = parse_decimal_field(json, &["original_size", "originalSize", "size"])?;
    let matched_size =
        parse_decimal_field(json, &["size_matched", "sizeMatched", "matched_size", "filled"]).unwrap_or_default();
    Some(FillStatus {
        matched_size,
        original_size,
    })
}

/// Parse a decimal field from JSON, trying multiple field names.
fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|key| {
        let value = json.get(*key)?;
        value
            .as_str()
            .and_then(|s| s.parse::<Decimal>().ok())
            .or_else(|| value.as_f64().and_then(|n| Decimal::try_from(n).ok()))
    })
}
