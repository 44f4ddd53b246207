//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::utils::retry::RetryPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Polymarket Credentials ===
    /// Wallet private key (hex, starts with 0x). Only required for live trading.
    #[serde(default)]
    pub polymarket_private_key: String,

    /// Signature type: 0=EOA, 1=Magic.link, 2=Gnosis Safe.
    #[serde(default)]
    pub polymarket_signature_type: u8,

    /// Proxy wallet address (required for Magic.link).
    #[serde(default)]
    pub polymarket_funder: Option<String>,

    // === Endpoints ===
    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// Gamma (market metadata) API base URL.
    #[serde(default = "default_gamma_url")]
    pub polymarket_gamma_url: String,

    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub polymarket_ws_url: String,

    /// Kalshi public trade API base URL.
    #[serde(default = "default_kalshi_url")]
    pub kalshi_api_url: String,

    // === Detection ===
    /// Base margin an opportunity must clear, in percent.
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: Decimal,

    /// Fee and slippage buffer charged per leg, in percent.
    #[serde(default = "default_fee_pct")]
    pub fee_pct: Decimal,

    /// Minimum bid-spread profit for the maker strategy, in percent.
    #[serde(default = "default_maker_min_spread_pct")]
    pub maker_min_spread_pct: Decimal,

    /// Instruments below this 24h volume get the volatility buffer.
    #[serde(default = "default_low_volume_threshold")]
    pub low_volume_threshold_usd: Decimal,

    /// Extra margin added for low-volume instruments, in percent.
    #[serde(default = "default_low_volume_buffer")]
    pub low_volume_buffer_pct: Decimal,

    /// Minimum notional at the best ask of each leg.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity_usd: Decimal,

    // === Sizing ===
    /// Notional used for pricing and as the sizing ceiling.
    #[serde(default = "default_target_trade_size")]
    pub target_trade_size_usd: Decimal,

    /// Floor size; trades below it are aborted.
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size_usd: Decimal,

    /// Fraction of the edge-proportional size to commit.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,

    /// Fixed scale applied by the sizing rule.
    #[serde(default = "default_sizing_scale")]
    pub sizing_scale: Decimal,

    // === Risk ===
    /// Session bankroll in USD.
    #[serde(default = "default_bankroll")]
    pub starting_bankroll_usd: Decimal,

    /// Cap on locked capital per market.
    #[serde(default = "default_max_market_exposure")]
    pub max_exposure_per_market_usd: Decimal,

    /// Cap on locked capital per event.
    #[serde(default = "default_max_event_exposure")]
    pub max_event_exposure_usd: Decimal,

    /// Cap on concurrently open hedge pairs.
    #[serde(default = "default_max_open_trades")]
    pub max_total_open_trades: u32,

    // === Execution ===
    /// Send real orders. When false every venue call goes to the dry-run path.
    #[serde(default)]
    pub live_trading: bool,

    /// Seconds an asymmetric pair may stay open before it is chased.
    #[serde(default = "default_hedge_timeout")]
    pub hedge_timeout_sec: u64,

    /// Price cap for the aggressive chase order.
    #[serde(default = "default_max_chase_price")]
    pub max_chase_price: Decimal,

    /// Failed chases after which a pair is flagged as stuck.
    #[serde(default = "default_max_chase_attempts")]
    pub max_chase_attempts: u32,

    /// Seconds between hedge reconciliation ticks.
    #[serde(default = "default_chase_interval")]
    pub chase_interval_sec: u64,

    // === Market Data ===
    /// Cached books older than this are refetched.
    #[serde(default = "default_ws_max_age")]
    pub ws_max_age_sec: u64,

    /// Enable WebSocket market feed into the cache.
    #[serde(default)]
    pub use_wss: bool,

    /// Minimum 24h volume for an instrument to be scanned.
    #[serde(default = "default_min_volume")]
    pub min_volume_24h: Decimal,

    /// Maximum Polymarket instruments per scan cycle.
    #[serde(default = "default_max_markets")]
    pub max_markets: usize,

    /// Maximum Kalshi markets fetched for cross-venue pairing.
    #[serde(default = "default_max_cross_markets")]
    pub max_cross_markets: usize,

    /// Optional comma-separated keyword filter on market questions.
    #[serde(default)]
    pub market_keywords: Option<String>,

    /// Price Polymarket instruments against paired Kalshi markets.
    #[serde(default)]
    pub cross_venue_enabled: bool,

    /// Concurrent book fetches per scan cycle.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    // === Scheduling ===
    /// Seconds between scan cycles.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_sec: u64,

    // === Retry ===
    /// Attempts per venue call before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between ordinary retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Backoff after a rate-limit signal in seconds.
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_sec: u64,

    // === Transport ===
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Idle connections kept per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    /// WebSocket reconnect backoff ceiling in seconds.
    #[serde(default = "default_ws_reconnect_max_delay")]
    pub ws_reconnect_max_delay_s: u64,

    /// WebSocket heartbeat interval in seconds.
    #[serde(default = "default_ws_heartbeat")]
    pub ws_heartbeat_interval_s: u64,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Expose Prometheus metrics on /metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_kalshi_url() -> String {
    "https://api.elections.kalshi.com/trade-api/v2".to_string()
}

fn default_min_profit_pct() -> Decimal {
    Decimal::ONE // 1%
}

fn default_fee_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5% per leg
}

fn default_maker_min_spread_pct() -> Decimal {
    Decimal::TWO
}

fn default_low_volume_threshold() -> Decimal {
    Decimal::new(50_000, 0)
}

fn default_low_volume_buffer() -> Decimal {
    Decimal::new(5, 1)
}

fn default_min_liquidity() -> Decimal {
    Decimal::new(100, 0)
}

fn default_target_trade_size() -> Decimal {
    Decimal::new(200, 0)
}

fn default_min_trade_size() -> Decimal {
    Decimal::new(5, 0)
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2) // quarter Kelly
}

fn default_sizing_scale() -> Decimal {
    Decimal::TEN
}

fn default_bankroll() -> Decimal {
    Decimal::new(50, 0)
}

fn default_max_market_exposure() -> Decimal {
    Decimal::new(20, 0)
}

fn default_max_event_exposure() -> Decimal {
    Decimal::new(30, 0)
}

fn default_max_open_trades() -> u32 {
    4
}

fn default_hedge_timeout() -> u64 {
    120
}

fn default_max_chase_price() -> Decimal {
    Decimal::new(99, 2)
}

fn default_max_chase_attempts() -> u32 {
    5
}

fn default_chase_interval() -> u64 {
    10
}

fn default_ws_max_age() -> u64 {
    5
}

fn default_min_volume() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_max_markets() -> usize {
    150
}

fn default_max_cross_markets() -> usize {
    1000
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_scan_interval() -> u64 {
    15
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_rate_limit_backoff() -> u64 {
    30
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_ws_reconnect_max_delay() -> u64 {
    30
}

fn default_ws_heartbeat() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket_private_key: String::new(),
            polymarket_signature_type: 0,
            polymarket_funder: None,
            polymarket_clob_url: default_clob_url(),
            polymarket_gamma_url: default_gamma_url(),
            polymarket_ws_url: default_ws_url(),
            kalshi_api_url: default_kalshi_url(),
            min_profit_pct: default_min_profit_pct(),
            fee_pct: default_fee_pct(),
            maker_min_spread_pct: default_maker_min_spread_pct(),
            low_volume_threshold_usd: default_low_volume_threshold(),
            low_volume_buffer_pct: default_low_volume_buffer(),
            min_liquidity_usd: default_min_liquidity(),
            target_trade_size_usd: default_target_trade_size(),
            min_trade_size_usd: default_min_trade_size(),
            kelly_fraction: default_kelly_fraction(),
            sizing_scale: default_sizing_scale(),
            starting_bankroll_usd: default_bankroll(),
            max_exposure_per_market_usd: default_max_market_exposure(),
            max_event_exposure_usd: default_max_event_exposure(),
            max_total_open_trades: default_max_open_trades(),
            live_trading: false,
            hedge_timeout_sec: default_hedge_timeout(),
            max_chase_price: default_max_chase_price(),
            max_chase_attempts: default_max_chase_attempts(),
            chase_interval_sec: default_chase_interval(),
            ws_max_age_sec: default_ws_max_age(),
            use_wss: false,
            min_volume_24h: default_min_volume(),
            max_markets: default_max_markets(),
            max_cross_markets: default_max_cross_markets(),
            market_keywords: None,
            cross_venue_enabled: false,
            fetch_concurrency: default_fetch_concurrency(),
            scan_interval_sec: default_scan_interval(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_backoff_sec: default_rate_limit_backoff(),
            http_timeout_ms: default_http_timeout_ms(),
            http_pool_size: default_http_pool_size(),
            ws_reconnect_max_delay_s: default_ws_reconnect_max_delay(),
            ws_heartbeat_interval_s: default_ws_heartbeat(),
            port: default_port(),
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        let hundred = Decimal::ONE_HUNDRED;

        if self.live_trading {
            if self.polymarket_private_key.is_empty() {
                return Err("POLYMARKET_PRIVATE_KEY is required for live trading".to_string());
            }
            if !self.polymarket_private_key.starts_with("0x") {
                return Err("POLYMARKET_PRIVATE_KEY must start with 0x".to_string());
            }
        }

        for (name, value) in [
            ("MIN_PROFIT_PCT", self.min_profit_pct),
            ("FEE_PCT", self.fee_pct),
            ("MAKER_MIN_SPREAD_PCT", self.maker_min_spread_pct),
            ("LOW_VOLUME_BUFFER_PCT", self.low_volume_buffer_pct),
        ] {
            if value < Decimal::ZERO || value >= hundred {
                return Err(format!("{} must be in [0, 100)", name));
            }
        }

        if self.kelly_fraction <= Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            return Err("KELLY_FRACTION must be in (0, 1]".to_string());
        }

        if self.sizing_scale <= Decimal::ZERO {
            return Err("SIZING_SCALE must be positive".to_string());
        }

        if self.min_trade_size_usd <= Decimal::ZERO {
            return Err("MIN_TRADE_SIZE_USD must be positive".to_string());
        }

        if self.min_trade_size_usd > self.target_trade_size_usd {
            return Err("MIN_TRADE_SIZE_USD must not exceed TARGET_TRADE_SIZE_USD".to_string());
        }

        if self.min_trade_size_usd > self.max_exposure_per_market_usd {
            return Err(
                "MIN_TRADE_SIZE_USD must not exceed MAX_EXPOSURE_PER_MARKET_USD".to_string(),
            );
        }

        if self.starting_bankroll_usd <= Decimal::ZERO
            || self.max_exposure_per_market_usd <= Decimal::ZERO
            || self.max_event_exposure_usd <= Decimal::ZERO
        {
            return Err("bankroll and exposure caps must be positive".to_string());
        }

        if self.max_exposure_per_market_usd > self.starting_bankroll_usd {
            return Err(
                "MAX_EXPOSURE_PER_MARKET_USD must not exceed STARTING_BANKROLL_USD".to_string(),
            );
        }

        if self.max_total_open_trades == 0 {
            return Err("MAX_TOTAL_OPEN_TRADES must be at least 1".to_string());
        }

        if self.max_chase_price <= Decimal::ZERO || self.max_chase_price >= Decimal::ONE {
            return Err("MAX_CHASE_PRICE must be in (0, 1)".to_string());
        }

        if self.fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be at least 1".to_string());
        }

        if self.retry_attempts == 0 {
            return Err("RETRY_ATTEMPTS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Retry policy for venue calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_secs(self.rate_limit_backoff_sec),
        )
    }

    /// Parsed keyword filter, lowercased and trimmed.
    pub fn keywords(&self) -> Vec<String> {
        self.market_keywords
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Staleness bound for cached books.
    pub fn max_book_age(&self) -> Duration {
        Duration::from_secs(self.ws_max_age_sec)
    }

    /// Timeout after which an asymmetric pair is chased.
    pub fn hedge_timeout(&self) -> Duration {
        Duration::from_secs(self.hedge_timeout_sec)
    }
}
