//! Real-time book feed from the Polymarket CLOB WebSocket.
//!
//! The feed keeps a depth map per subscribed token and writes a canonical
//! [`OutcomeBook`] into the [`MarketDataCache`] after every applied event, so
//! the scan loop only ever reads the cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::cache::MarketDataCache;
use super::types::{OutcomeBook, PriceLevel};
use crate::error::WsError;
use crate::metrics;

/// One resting level as the feed sends it. Prices and sizes arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedLevel {
    /// Level price.
    pub price: Decimal,
    /// Shares resting at the price.
    pub size: Decimal,
}

/// Which side of the book a delta touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedSide {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

/// Incremental change to one price level. Size zero removes the level.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelDelta {
    /// Token the delta applies to, when the feed tags it per change.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Level price.
    pub price: Decimal,
    /// New size at the price, not a difference.
    pub size: Decimal,
    /// Book side.
    pub side: FeedSide,
}

/// Market-channel events. Anything else on the channel is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Full snapshot for one token.
    Book {
        asset_id: String,
        #[serde(default)]
        bids: Vec<FeedLevel>,
        #[serde(default)]
        asks: Vec<FeedLevel>,
    },
    /// Deltas, each tagged with its token or inheriting the event's.
    PriceChange {
        #[serde(default)]
        asset_id: Option<String>,
        #[serde(default)]
        price_changes: Vec<LevelDelta>,
    },
    /// Ticks, trades and anything else not used for depth.
    #[serde(other)]
    Other,
}

/// Depth kept per token between events.
#[derive(Debug, Clone, Default)]
pub struct DepthMap {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl DepthMap {
    fn from_snapshot(bids: &[FeedLevel], asks: &[FeedLevel]) -> Self {
        let side = |levels: &[FeedLevel]| {
            levels
                .iter()
                .filter(|l| l.size > Decimal::ZERO)
                .map(|l| (l.price, l.size))
                .collect()
        };
        Self {
            bids: side(bids),
            asks: side(asks),
        }
    }

    fn apply(&mut self, delta: &LevelDelta) {
        let side = match delta.side {
            FeedSide::Buy => &mut self.bids,
            FeedSide::Sell => &mut self.asks,
        };
        if delta.size > Decimal::ZERO {
            side.insert(delta.price, delta.size);
        } else {
            side.remove(&delta.price);
        }
    }

    fn to_book(&self, token_id: &str) -> OutcomeBook {
        let levels = |side: &BTreeMap<Decimal, Decimal>| {
            side.iter()
                .map(|(&price, &size)| PriceLevel { price, size })
                .collect::<Vec<_>>()
        };
        OutcomeBook::new(token_id, levels(&self.bids), levels(&self.asks))
    }
}

#[derive(Serialize)]
struct Subscription<'a> {
    #[serde(rename = "type")]
    channel: &'static str,
    assets_ids: &'a [String],
}

/// Backoff and keepalive settings for the feed connection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Ceiling on the doubled delay.
    pub max_delay: Duration,
    /// Ping interval while connected.
    pub heartbeat: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            heartbeat: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// Build from the configured ceiling and ping interval, in seconds.
    /// A zero interval is raised to one second.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay: Duration::from_secs(max_delay_s),
            heartbeat: Duration::from_secs(heartbeat_interval_s.max(1)),
            ..Default::default()
        }
    }

    /// Delay before reconnect number `attempt`, doubling up to `max_delay`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << attempt.min(16))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// WebSocket feed that keeps the [`MarketDataCache`] warm.
pub struct MarketFeed {
    depth: DashMap<String, DepthMap>,
    cache: Arc<MarketDataCache>,
    ws_url: String,
    reconnect: ReconnectConfig,
    connected: AtomicBool,
    reconnects: AtomicU64,
}

impl MarketFeed {
    /// Create a disconnected feed that writes into `cache`.
    pub fn new(ws_url: String, cache: Arc<MarketDataCache>, reconnect: ReconnectConfig) -> Self {
        Self {
            depth: DashMap::new(),
            cache,
            ws_url,
            reconnect,
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Reconnects since the feed started.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Subscribe to `asset_ids` and keep the subscription alive in the
    /// background, reconnecting with exponential backoff.
    pub fn subscribe(self: Arc<Self>, asset_ids: Vec<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                match self.session(&asset_ids).await {
                    Ok(()) => {
                        attempt = 0;
                        warn!("Market feed closed by server");
                    }
                    Err(e) => error!(error = %e, attempt, "Market feed session failed"),
                }
                self.connected.store(false, Ordering::SeqCst);
                self.reconnects.fetch_add(1, Ordering::SeqCst);
                metrics::inc_ws_reconnects();

                let delay = self.reconnect.next_delay(attempt);
                info!(delay_ms = delay.as_millis() as u64, "Reconnecting market feed");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        })
    }

    /// One connection: subscribe, then pump messages and heartbeats until the stream ends.
    async fn session(&self, asset_ids: &[String]) -> Result<(), WsError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));
        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let subscription = serde_json::to_string(&Subscription {
            channel: "MARKET",
            assets_ids: asset_ids,
        })
        .map_err(|e| WsError::SendFailed(e.to_string()))?;
        sink.send(Message::Text(subscription))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;

        self.connected.store(true, Ordering::SeqCst);
        info!(%url, assets = asset_ids.len(), "Market feed subscribed");

        let mut heartbeat = tokio::time::interval(self.reconnect.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    sink.send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                msg = source.next() => {
                    let Some(msg) = msg else { return Ok(()) };
                    match msg? {
                        Message::Text(text) => {
                            let start = Instant::now();
                            metrics::inc_ws_messages_received();
                            let written = self.apply_message(&text);
                            metrics::record_ws_message_latency(start);
                            debug!(written, "Feed message applied");
                        }
                        Message::Close(frame) => {
                            warn!(?frame, "Market feed close frame");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Apply one feed message (a single event or an array of them) and
    /// refresh the cache for every touched token.
    ///
    /// Returns the number of books written. Unparseable messages are ignored.
    pub fn apply_message(&self, text: &str) -> usize {
        let events = match serde_json::from_str::<Vec<FeedEvent>>(text) {
            Ok(events) => events,
            Err(_) => match serde_json::from_str::<FeedEvent>(text) {
                Ok(event) => vec![event],
                Err(e) => {
                    debug!(error = %e, "Unparseable feed message");
                    return 0;
                }
            },
        };

        let mut touched = BTreeSet::new();
        for event in events {
            match event {
                FeedEvent::Book { asset_id, bids, asks } => {
                    self.depth
                        .insert(asset_id.clone(), DepthMap::from_snapshot(&bids, &asks));
                    touched.insert(asset_id);
                }
                FeedEvent::PriceChange {
                    asset_id,
                    price_changes,
                } => {
                    for delta in &price_changes {
                        let Some(token) = delta.asset_id.as_ref().or(asset_id.as_ref()) else {
                            continue;
                        };
                        // No snapshot yet: nothing to patch.
                        if let Some(mut depth) = self.depth.get_mut(token) {
                            depth.apply(delta);
                            touched.insert(token.clone());
                        }
                    }
                }
                FeedEvent::Other => {}
            }
        }

        for token in &touched {
            if let Some(depth) = self.depth.get(token) {
                self.cache.insert(depth.to_book(token));
            }
        }
        touched.len()
    }
}
