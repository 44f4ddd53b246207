//! End-to-end tests for the scan, execution, and chase pipeline.
//!
//! Everything runs against the in-crate mock market data and mock venue. The
//! network tests at the bottom talk to the real APIs.
//! Run them with: cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;
use tower::ServiceExt;

use polyhedge::api::{create_router, AppState};
use polyhedge::arbitrage::{
    ChaseParams, ExecutionResult, HedgeChaser, OpportunityDetector, OrderExecutor, PairRegistry, PositionSizer,
    ScanSettings, Scanner,
};
use polyhedge::config::Config;
use polyhedge::error::{PipelineError, RiskRejection};
use polyhedge::market::mock::{binary_instrument, MockMarketData, MockOrderBookBuilder};
use polyhedge::market::{MarketDataProvider, MarketFilter, PolymarketClient};
use polyhedge::orderbook::MarketDataCache;
use polyhedge::risk::RiskManager;
use polyhedge::trading::{DryRunVenue, MockCancel, MockSubmit, MockVenue, OrderVenue};
use polyhedge::utils::RetryPolicy;

struct Engine {
    market: MockMarketData,
    risk: Arc<RiskManager>,
    registry: Arc<PairRegistry>,
    scanner: Scanner,
    chaser: HedgeChaser,
}

fn config() -> Config {
    Config {
        min_liquidity_usd: dec!(0),
        ..Config::default()
    }
}

fn engine(venue: Arc<dyn OrderVenue>) -> Engine {
    let config = config();
    let market = MockMarketData::new();
    let risk = Arc::new(RiskManager::from_config(&config));
    let registry = Arc::new(PairRegistry::new());
    let cache = Arc::new(MarketDataCache::new(RetryPolicy::none()));

    let executor = Arc::new(OrderExecutor::new(
        Arc::clone(&risk),
        Arc::clone(&venue),
        Arc::clone(&registry),
        PositionSizer::from(&config),
    ));
    let scanner = Scanner::new(
        Arc::new(market.clone()),
        Arc::new(OpportunityDetector::from_config(&config, cache)),
        ScanSettings::from(&config),
        RetryPolicy::none(),
    )
    .with_executor(executor);
    let chaser = HedgeChaser::new(
        venue,
        Arc::clone(&risk),
        Arc::clone(&registry),
        ChaseParams::from(&config),
    );

    Engine {
        market,
        risk,
        registry,
        scanner,
        chaser,
    }
}

/// List `ids` as profitable binary markets (YES 0.40 + NO 0.55), each in its own event.
fn list_profitable(market: &MockMarketData, ids: &[&str]) {
    market.set_instruments(
        ids.iter()
            .map(|id| binary_instrument(id, &format!("event-{id}"), dec!(100000)))
            .collect(),
    );
    for id in ids {
        market.set_order_book(
            MockOrderBookBuilder::new(format!("{id}-yes"))
                .ask(dec!(0.40), dec!(1000))
                .build(),
        );
        market.set_order_book(
            MockOrderBookBuilder::new(format!("{id}-no"))
                .ask(dec!(0.55), dec!(1000))
                .build(),
        );
    }
}

async fn order_ids(registry: &PairRegistry) -> Vec<(String, String)> {
    registry
        .snapshot()
        .await
        .into_iter()
        .map(|p| (p.leg_a.order_id, p.leg_b.order_id))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn opened_pair_fills_and_releases_capital() {
    let venue = MockVenue::new();
    let e = engine(Arc::new(venue.clone()));
    list_profitable(&e.market, &["btc"]);

    let report = e.scanner.scan_once().await.unwrap();

    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(report.executions.len(), 1);
    assert!(report.executions[0].is_opened());
    let locked = e.risk.status().capital_locked;
    assert!(locked > Decimal::ZERO);

    let (a, b) = order_ids(&e.registry).await.remove(0);
    venue.fill_all(&a);
    venue.fill_all(&b);

    let tick = e.chaser.tick().await;
    assert_eq!(tick.filled.len(), 1);
    assert!(e.registry.is_empty().await);
    assert_eq!(e.risk.status().capital_locked, dec!(0));
    assert_eq!(e.risk.status().open_trades, 0);
}

#[tokio::test(start_paused = true)]
async fn one_sided_fill_is_chased_after_timeout() {
    let venue = MockVenue::new();
    let e = engine(Arc::new(venue.clone()));
    list_profitable(&e.market, &["eth"]);

    e.scanner.scan_once().await.unwrap();
    let (a, b) = order_ids(&e.registry).await.remove(0);
    venue.fill_all(&a);

    assert_eq!(e.chaser.tick().await.open, 1);

    tokio::time::advance(Duration::from_secs(150)).await;
    let tick = e.chaser.tick().await;

    assert_eq!(tick.chased.len(), 1);
    assert!(tick.closed.iter().all(|pair| pair.chased));
    assert_eq!(venue.cancelled(), vec![b.clone()]);
    let chase = venue.submitted().pop().unwrap();
    assert_eq!(chase.token_id, "eth-no");
    assert_eq!(chase.price, dec!(0.99));
    assert_eq!(Some(chase.size), venue.order(&b).map(|spec| spec.size));
    assert_eq!(e.risk.status().open_trades, 0);
}

#[tokio::test]
async fn open_trade_cap_limits_a_busy_cycle() {
    let venue = MockVenue::new();
    let e = engine(Arc::new(venue.clone()));
    list_profitable(&e.market, &["a", "b", "c", "d", "f"]);

    let report = e.scanner.scan_once().await.unwrap();

    let opened = report.executions.iter().filter(|r| r.is_opened()).count();
    assert_eq!(opened, 4);
    let rejected: Vec<_> = report
        .executions
        .iter()
        .filter_map(|r| match &r.result {
            ExecutionResult::Failed(PipelineError::RiskRejected(reason)) => Some(reason.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(rejected.len(), 1);
    assert!(matches!(rejected[0], RiskRejection::MaxOpenTrades { limit: 4 }));
    assert_eq!(venue.submitted().len(), 8);
    assert_eq!(e.registry.len().await, 4);
}

#[tokio::test]
async fn unconfirmed_rollback_shows_on_status_endpoint() {
    let venue = MockVenue::new();
    venue.script([MockSubmit::Accept, MockSubmit::Reject("insufficient balance".to_string())]);
    venue.set_cancel(MockCancel::Fail);
    let e = engine(Arc::new(venue.clone()));
    list_profitable(&e.market, &["sol"]);

    let report = e.scanner.scan_once().await.unwrap();
    match &report.executions[0].result {
        ExecutionResult::Failed(err) => assert!(err.is_escalation()),
        other => panic!("unexpected result {other:?}"),
    }

    let state = AppState::new(Arc::clone(&e.risk), Arc::clone(&e.registry), false);
    let response = create_router(state)
        .oneshot(Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: serde_json::Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();

    assert_eq!(body["status"], "unhedged");
    assert_eq!(body["open_pairs"], 0);
    assert_eq!(body["risk"]["open_trades"], 1);
    assert_eq!(body["unhedged"][0]["order_id"], "mock-1");
}

#[tokio::test]
async fn dry_run_opens_paper_pairs() {
    let e = engine(Arc::new(DryRunVenue::new()));
    list_profitable(&e.market, &["xrp"]);

    let report = assert_ok!(e.scanner.scan_once().await);

    assert!(report.executions[0].is_opened());
    let (a, b) = order_ids(&e.registry).await.remove(0);
    assert!(a.starts_with("dry-"));
    assert!(b.starts_with("dry-"));

    // Paper orders never fill, so the pair just waits.
    assert_eq!(e.chaser.tick().await.open, 1);
}

#[tokio::test]
async fn failing_book_fetches_skip_without_trading() {
    let venue = MockVenue::new();
    let e = engine(Arc::new(venue.clone()));
    list_profitable(&e.market, &["doge"]);
    e.market.fail_books(true);

    let report = assert_ok!(e.scanner.scan_once().await);

    assert_eq!(report.skipped, 1);
    assert!(report.opportunities.is_empty());
    assert!(venue.submitted().is_empty());
}

/// Test that live market listing parses.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_list_active_markets() {
    let config = Config::default();
    let client = PolymarketClient::new(&config).unwrap();
    let filter = MarketFilter {
        min_volume: config.min_volume_24h,
        keywords: Vec::new(),
        limit: 10,
    };

    let markets = client.list_active(&filter).await.unwrap();
    println!("Found {} markets", markets.len());
    for m in &markets {
        println!("  {} ({} legs, vol {})", m.label, m.legs.len(), m.volume_24h);
        assert!(m.volume_24h >= config.min_volume_24h);
    }
}

/// Test that a live order book can be fetched for a listed market.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_get_order_book() {
    let config = Config::default();
    let client = PolymarketClient::new(&config).unwrap();
    let filter = MarketFilter {
        limit: 1,
        ..MarketFilter::default()
    };

    let markets = client.list_active(&filter).await.unwrap();
    let Some(market) = markets.first() else {
        println!("Skipping: no active markets");
        return;
    };

    let book = client.get_book(&market.legs[0].token_id).await.unwrap();
    println!("Order book for {}:", market.slug);
    println!("  Bids: {} levels", book.bids.len());
    println!("  Asks: {} levels", book.asks.len());
    assert!(!book.is_inverted());
}
