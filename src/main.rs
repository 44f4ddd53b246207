//! Polyhedge entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use polyhedge::api::{create_router, AppState};
use polyhedge::arbitrage::{
    ChaseParams, ExecutionResult, HedgeChaser, OpportunityDetector, OrderExecutor, PairRegistry, PositionSizer,
    ScanSettings, Scanner,
};
use polyhedge::config::Config;
use polyhedge::market::client::build_http_client;
use polyhedge::market::discovery::event_url;
use polyhedge::market::{KalshiClient, MarketDataProvider, PolymarketClient};
use polyhedge::metrics;
use polyhedge::orderbook::{MarketDataCache, MarketFeed, ReconnectConfig};
use polyhedge::risk::RiskManager;
use polyhedge::signing::{address_from_private_key, WalletKind};
use polyhedge::trading::{ClobVenue, DryRunVenue, OrderVenue};
use polyhedge::utils::shutdown_signal;

/// Prediction-market hedge arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "polyhedge")]
#[command(about = "Scans prediction markets for hedge arbitrage and executes two-leg orders")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scan, execution, and chase loops (default).
    Run {
        /// Send real orders, overriding LIVE_TRADING.
        #[arg(long)]
        live: bool,

        /// Run a single scan cycle and exit.
        #[arg(long)]
        once: bool,

        /// HTTP server port for health/metrics.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Run one detection pass without executing.
    Scan,

    /// Test WebSocket connection (diagnostic).
    WsTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("polyhedge=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(fmt::layer))
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Scan) => cmd_scan().await,
        Some(Command::WsTest) => cmd_ws_test().await,
        Some(Command::Run { live, once, port }) => cmd_run(live, once, port).await,
        None => cmd_run(false, false, None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("POLYHEDGE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Checking private key... ");
    match address_from_private_key(&config.polymarket_private_key) {
        Ok(addr) => {
            println!("OK");
            println!("  Wallet address: {}", addr);
        }
        Err(_) if !config.live_trading => println!("SKIPPED (dry run)"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Private key invalid"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Wallet Kind: {}", WalletKind::from_u8(config.polymarket_signature_type));
    println!("  Live Trading: {}", config.live_trading);
    println!(
        "  Min Profit: {}% (+{}% below ${} volume)",
        config.min_profit_pct, config.low_volume_buffer_pct, config.low_volume_threshold_usd
    );
    println!("  Fee Buffer: {}% per leg", config.fee_pct);
    println!("  Trade Size: ${} - ${}", config.min_trade_size_usd, config.target_trade_size_usd);
    println!("  Bankroll: ${}", config.starting_bankroll_usd);
    println!(
        "  Caps: ${} per market, ${} per event, {} open trades",
        config.max_exposure_per_market_usd, config.max_event_exposure_usd, config.max_total_open_trades
    );
    println!(
        "  Chase: after {}s at ${} (max {} attempts)",
        config.hedge_timeout_sec, config.max_chase_price, config.max_chase_attempts
    );
    println!("  WebSocket: {}", if config.use_wss { "Enabled" } else { "Disabled" });
    println!("  Cross-venue: {}", if config.cross_venue_enabled { "Enabled" } else { "Disabled" });
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Market data side of the pipeline.
struct DataPlane {
    http: reqwest::Client,
    poly: Arc<dyn MarketDataProvider>,
    cache: Arc<MarketDataCache>,
}

impl DataPlane {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self {
            poly: Arc::new(PolymarketClient::with_http(http.clone(), config)),
            cache: Arc::new(MarketDataCache::new(config.retry_policy())),
            http,
        })
    }

    fn scanner(&self, config: &Config) -> Scanner {
        let detector = Arc::new(OpportunityDetector::from_config(config, Arc::clone(&self.cache)));
        let scanner = Scanner::new(
            Arc::clone(&self.poly),
            detector,
            ScanSettings::from(config),
            config.retry_policy(),
        );
        if config.cross_venue_enabled {
            scanner.with_kalshi(Arc::new(KalshiClient::with_http(self.http.clone(), config)))
        } else {
            scanner
        }
    }
}

/// Run one detection pass and print what was found.
async fn cmd_scan() -> anyhow::Result<()> {
    let config = load_config()?;
    let data = DataPlane::new(&config)?;
    let report = data.scanner(&config).scan_once().await?;

    println!("======================================================================");
    println!("POLYHEDGE - SCAN");
    println!("======================================================================");
    println!("  Instruments: {}  Skipped: {}", report.instruments, report.skipped);
    for opp in &report.opportunities {
        println!(
            "  [{}] {} cost={} profit={}% size=${}",
            opp.strategy,
            opp.instrument.label,
            opp.total_cost.round_dp(4),
            opp.profit_pct.round_dp(2),
            opp.recommended_notional.round_dp(2)
        );
        println!("      {}", event_url(&opp.instrument.slug));
    }
    if report.opportunities.is_empty() {
        println!("  No opportunities this cycle.");
    }
    println!("======================================================================");
    Ok(())
}

/// Run the engine.
async fn cmd_run(live: bool, once: bool, port: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load()?;
    if live {
        config.live_trading = true;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!(
        mode = if config.live_trading { "LIVE TRADING" } else { "DRY RUN" },
        min_profit_pct = %config.min_profit_pct,
        bankroll = %config.starting_bankroll_usd,
        "Configuration loaded"
    );

    let prometheus = if config.metrics_enabled {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let data = DataPlane::new(&config)?;
    let risk = Arc::new(RiskManager::from_config(&config));
    let registry = Arc::new(PairRegistry::new());
    let venue: Arc<dyn OrderVenue> = if config.live_trading {
        Arc::new(ClobVenue::new(data.http.clone(), &config)?)
    } else {
        Arc::new(DryRunVenue::new())
    };

    let executor = Arc::new(OrderExecutor::new(
        Arc::clone(&risk),
        Arc::clone(&venue),
        Arc::clone(&registry),
        PositionSizer::from(&config),
    ));
    info!(venue = executor.venue_name(), "Executor ready");
    let scanner = data.scanner(&config).with_executor(executor);
    let chaser = Arc::new(HedgeChaser::new(
        venue,
        Arc::clone(&risk),
        Arc::clone(&registry),
        ChaseParams::from(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut app_state = AppState::new(Arc::clone(&risk), Arc::clone(&registry), config.live_trading);
    if let Some(handle) = prometheus {
        app_state = app_state.with_prometheus(handle);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    let router = create_router(app_state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let stop = async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(stop).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    if config.use_wss {
        match scanner.list_instruments().await {
            Ok(instruments) => {
                let tokens = instruments
                    .iter()
                    .flat_map(|i| i.legs.iter().map(|l| l.token_id.clone()))
                    .collect();
                let feed = Arc::new(MarketFeed::new(
                    config.polymarket_ws_url.clone(),
                    Arc::clone(&data.cache),
                    ReconnectConfig::from_config(config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s),
                ));
                let _feed_task = feed.subscribe(tokens);
            }
            Err(e) => warn!(error = %e, "Could not list markets for the feed, using REST books"),
        }
    }

    if once {
        let report = scanner.scan_once().await?;
        let tick = chaser.tick().await;
        let opened = report
            .executions
            .iter()
            .filter(|e| matches!(e.result, ExecutionResult::Opened { .. }))
            .count();
        info!(
            opportunities = report.opportunities.len(),
            opened,
            open_pairs = tick.open,
            "Single cycle complete"
        );
        return Ok(());
    }

    let chaser_task = tokio::spawn(
        Arc::clone(&chaser).run(Duration::from_secs(config.chase_interval_sec), shutdown_rx.clone()),
    );

    app_state.set_ready(true);
    scanner.run(shutdown_rx).await;

    if let Err(e) = chaser_task.await {
        warn!(error = %e, "Chaser task ended abnormally");
    }

    let status = risk.status();
    info!(
        open_trades = status.open_trades,
        capital_locked = %status.capital_locked,
        open_pairs = registry.len().await,
        "Shutdown complete"
    );
    Ok(())
}

/// Test WebSocket connection (diagnostic).
async fn cmd_ws_test() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("POLYHEDGE - WEBSOCKET TEST");
    println!("======================================================================");

    let config = load_config()?;
    let data = DataPlane::new(&config)?;

    println!("\n1. Listing active markets...");
    let instruments = data.scanner(&config).list_instruments().await?;
    let Some(instrument) = instruments.first() else {
        println!("   No market passes the filter.");
        return Ok(());
    };
    println!("   Found: {} ({} legs)", instrument.slug, instrument.legs.len());

    println!("\n2. Connecting to WebSocket...");
    let tokens: Vec<String> = instrument.legs.iter().map(|l| l.token_id.clone()).collect();
    let feed = Arc::new(MarketFeed::new(
        config.polymarket_ws_url.clone(),
        Arc::clone(&data.cache),
        ReconnectConfig::from_config(config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s),
    ));
    let handle = Arc::clone(&feed).subscribe(tokens.clone());

    println!("\n3. Waiting for book updates (10 seconds)...");
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    for token in &tokens {
        match data.cache.get(token) {
            Some(book) => println!(
                "   {} bid={:?} ask={:?} age={:?}",
                token,
                book.best_bid(),
                book.best_ask(),
                data.cache.age(token)
            ),
            None => println!("   {} no book received", token),
        }
    }

    println!("\n======================================================================");
    println!("WEBSOCKET TEST COMPLETE");
    println!("  Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    println!("  Books cached: {}", data.cache.len());
    println!("  Connected: {}", feed.is_connected());
    println!("  Reconnects: {}", feed.reconnect_attempts());
    println!("======================================================================");

    Ok(())
}
