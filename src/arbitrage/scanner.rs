//! Fixed-interval scan loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::calculator::Opportunity;
use super::detector::OpportunityDetector;
use super::executor::{ExecutionReport, OrderExecutor};
use crate::config::Config;
use crate::error::{MarketError, PipelineError};
use crate::market::discovery::discover_cross_venue;
use crate::market::{Instrument, MarketDataProvider, MarketFilter};
use crate::metrics;
use crate::utils::RetryPolicy;

/// Listing and fan-out settings.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Polymarket listing filter.
    pub poly_filter: MarketFilter,
    /// Kalshi listing filter.
    pub kalshi_filter: MarketFilter,
    /// Whether to pair instruments across venues.
    pub cross_venue: bool,
    /// Instruments fetched concurrently.
    pub fetch_concurrency: usize,
    /// Time between cycles.
    pub interval: Duration,
}

impl From<&Config> for ScanSettings {
    fn from(config: &Config) -> Self {
        Self {
            poly_filter: MarketFilter {
                min_volume: config.min_volume_24h,
                keywords: config.keywords(),
                limit: config.max_markets,
            },
            kalshi_filter: MarketFilter {
                limit: config.max_cross_markets,
                ..MarketFilter::default()
            },
            cross_venue: config.cross_venue_enabled,
            fetch_concurrency: config.fetch_concurrency.max(1),
            interval: Duration::from_secs(config.scan_interval_sec),
        }
    }
}

/// What one cycle found and did.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Instruments evaluated.
    pub instruments: usize,
    /// Instruments skipped for missing or thin books.
    pub skipped: usize,
    /// Opportunities found, most profitable first.
    pub opportunities: Vec<Opportunity>,
    /// Execution attempts made this cycle.
    pub executions: Vec<ExecutionReport>,
}

/// Lists markets, detects opportunities, and hands them to the executor.
pub struct Scanner {
    poly: Arc<dyn MarketDataProvider>,
    kalshi: Option<Arc<dyn MarketDataProvider>>,
    detector: Arc<OpportunityDetector>,
    executor: Option<Arc<OrderExecutor>>,
    settings: ScanSettings,
    retry: RetryPolicy,
}

impl Scanner {
    /// Create a scanner. Without an executor, cycles only detect.
    pub fn new(
        poly: Arc<dyn MarketDataProvider>,
        detector: Arc<OpportunityDetector>,
        settings: ScanSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            poly,
            kalshi: None,
            detector,
            executor: None,
            settings,
            retry,
        }
    }

    /// Execute opportunities through `executor`.
    pub fn with_executor(mut self, executor: Arc<OrderExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Pair markets with a Kalshi provider.
    pub fn with_kalshi(mut self, kalshi: Arc<dyn MarketDataProvider>) -> Self {
        self.kalshi = Some(kalshi);
        self
    }

    /// Active Polymarket instruments passing the filter.
    pub async fn list_instruments(&self) -> Result<Vec<Instrument>, MarketError> {
        self.retry
            .run("list_active", || self.poly.list_active(&self.settings.poly_filter))
            .await
    }

    /// Run one full cycle.
    #[instrument(skip(self))]
    pub async fn scan_once(&self) -> Result<ScanReport, MarketError> {
        let start = Instant::now();
        let _cycle = metrics::timer_scan_cycle();
        let instruments = self.list_instruments().await?;
        let mut report = ScanReport {
            instruments: instruments.len(),
            ..ScanReport::default()
        };

        let results: Vec<Result<Vec<Opportunity>, PipelineError>> = stream::iter(instruments)
            .map(|instrument| async move { self.detector.scan_instrument(self.poly.as_ref(), &instrument).await })
            .buffer_unordered(self.settings.fetch_concurrency)
            .collect()
            .await;
        self.absorb(&mut report, results);

        if self.settings.cross_venue {
            if let Some(kalshi) = &self.kalshi {
                self.scan_cross_venue(kalshi.as_ref(), &mut report).await;
            }
        }

        report
            .opportunities
            .sort_by(|a, b| b.profit_pct.cmp(&a.profit_pct));

        if let Some(executor) = &self.executor {
            let mut attempted = HashSet::new();
            for opp in report.opportunities.iter().filter(|o| o.is_executable()) {
                if attempted.insert(opp.instrument.id.clone()) {
                    report.executions.push(executor.execute(opp).await);
                }
            }
        }

        info!(
            instruments = report.instruments,
            skipped = report.skipped,
            opportunities = report.opportunities.len(),
            opened = report.executions.iter().filter(|e| e.is_opened()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scan cycle complete"
        );
        Ok(report)
    }

    async fn scan_cross_venue(&self, kalshi: &dyn MarketDataProvider, report: &mut ScanReport) {
        let pairs = match discover_cross_venue(
            self.poly.as_ref(),
            &self.settings.poly_filter,
            kalshi,
            &self.settings.kalshi_filter,
        )
        .await
        {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "Cross-venue discovery failed");
                return;
            }
        };

        let results: Vec<Result<Vec<Opportunity>, PipelineError>> = stream::iter(pairs)
            .map(|(poly, kalshi_instrument)| async move {
                self.detector
                    .scan_cross_venue(self.poly.as_ref(), &poly, kalshi, &kalshi_instrument)
                    .await
            })
            .buffer_unordered(self.settings.fetch_concurrency)
            .collect()
            .await;
        self.absorb(report, results);
    }

    fn absorb(&self, report: &mut ScanReport, results: Vec<Result<Vec<Opportunity>, PipelineError>>) {
        for result in results {
            match result {
                Ok(found) => report.opportunities.extend(found),
                Err(e) => {
                    debug!(error = %e, "Instrument skipped");
                    report.skipped += 1;
                }
            }
        }
    }

    /// Scan every interval until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_s = self.settings.interval.as_secs(), "Scan loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "Scan cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scan loop stopped");
    }
}
