// =============================================================================
// Market Data Collector — backfill once, then poll latest prices
// =============================================================================
//
// Startup: fetch `backfill_candles` of 1h/4h/1d history for the default pairs
// and the reference symbol.
//
// Steady state, every `interval`:
//   working set = tracked pairs ∪ default pairs ∪ reference symbol
//   for each symbol:
//     - first sight after startup -> backfill its history
//     - price cache hit           -> nothing to do
//     - miss                      -> fetch, cache, append a zero-width 1h candle
//
// A failing symbol is logged and skipped. A failing cycle (e.g. the
// subscriber directory is down) sleeps `error_backoff` instead of `interval`.
// This is the only writer of fetched data into the candle store.
// =============================================================================

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::interfaces::{MarketFeed, SubscriberDirectory};
use crate::market_data::{Candle, CandleStore, PriceCache};
use crate::runtime_config::RelayConfig;
use crate::shutdown;
use crate::types::Timeframe;

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    pub error_backoff: Duration,
    pub request_throttle: Duration,
    pub backfill_candles: u32,
    pub default_symbols: Vec<String>,
    pub reference_symbol: String,
}

impl CollectorSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.collector_interval_secs),
            error_backoff: Duration::from_secs(config.collector_error_backoff_secs),
            request_throttle: Duration::from_millis(config.request_throttle_ms),
            backfill_candles: config.backfill_candles,
            default_symbols: config.default_symbols.clone(),
            reference_symbol: config.reference_symbol.clone(),
        }
    }
}

/// Per-cycle tallies, logged and kept for the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CollectStats {
    pub symbols: usize,
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
    pub backfilled: usize,
}

pub struct Collector {
    feed: Arc<dyn MarketFeed>,
    directory: Arc<dyn SubscriberDirectory>,
    candles: Arc<CandleStore>,
    prices: Arc<PriceCache>,
    settings: CollectorSettings,
    /// Symbols whose history has been requested once already.
    backfilled: Mutex<HashSet<String>>,
    last_stats: Mutex<Option<CollectStats>>,
}

impl Collector {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        directory: Arc<dyn SubscriberDirectory>,
        candles: Arc<CandleStore>,
        prices: Arc<PriceCache>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            feed,
            directory,
            candles,
            prices,
            settings,
            backfilled: Mutex::new(HashSet::new()),
            last_stats: Mutex::new(None),
        }
    }

    pub fn last_stats(&self) -> Option<CollectStats> {
        *self.last_stats.lock()
    }

    // -------------------------------------------------------------------------
    // Backfill
    // -------------------------------------------------------------------------

    /// Default pairs plus the reference symbol, deduplicated, stable order.
    fn startup_symbols(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = self.settings.default_symbols.iter().cloned().collect();
        set.insert(self.settings.reference_symbol.clone());
        set.into_iter().collect()
    }

    /// Backfill every startup symbol. Returns the number of candles loaded.
    pub async fn backfill(&self) -> usize {
        info!("loading historical data for all timeframes");
        let mut total = 0;
        for symbol in self.startup_symbols() {
            total += self.backfill_symbol(&symbol).await;
        }
        info!(candles = total, "historical data loaded");
        total
    }

    /// Fetch history for one symbol across all timeframes. Per-request
    /// failures are logged and skipped; the symbol is never retried.
    pub async fn backfill_symbol(&self, symbol: &str) -> usize {
        self.backfilled.lock().insert(symbol.to_string());

        let mut loaded = 0;
        for timeframe in Timeframe::ALL {
            match self
                .feed
                .fetch_history(symbol, timeframe, self.settings.backfill_candles)
                .await
            {
                Ok(history) => {
                    let mut history: Vec<Candle> = history.into_iter().filter(Candle::is_finite).collect();
                    history.sort_by_key(|c| c.timestamp);
                    self.candles.extend(symbol, timeframe, &history);
                    info!(symbol, %timeframe, count = history.len(), "history loaded");
                    loaded += history.len();
                }
                Err(e) => {
                    warn!(symbol, %timeframe, error = %e, "history fetch failed");
                }
            }
            if !self.settings.request_throttle.is_zero() {
                tokio::time::sleep(self.settings.request_throttle).await;
            }
        }
        loaded
    }

    fn needs_backfill(&self, symbol: &str) -> bool {
        !self.backfilled.lock().contains(symbol)
    }

    // -------------------------------------------------------------------------
    // Steady state
    // -------------------------------------------------------------------------

    pub async fn working_symbols(&self) -> Result<Vec<String>> {
        let tracked = self
            .directory
            .list_globally_tracked_symbols()
            .await
            .context("failed to list tracked symbols")?;

        let mut set: BTreeSet<String> = tracked.into_iter().collect();
        set.extend(self.settings.default_symbols.iter().cloned());
        set.insert(self.settings.reference_symbol.clone());
        Ok(set.into_iter().collect())
    }

    /// One collection pass. `now` (UNIX seconds) stamps synthetic candles.
    pub async fn collect_once(&self, now: i64) -> Result<CollectStats> {
        let symbols = self.working_symbols().await?;
        let mut stats = CollectStats {
            symbols: symbols.len(),
            ..CollectStats::default()
        };

        for symbol in &symbols {
            if self.needs_backfill(symbol) {
                info!(symbol, "new symbol in working set, backfilling");
                self.backfill_symbol(symbol).await;
                stats.backfilled += 1;
            }

            if self.prices.get(symbol).is_some() {
                stats.cached += 1;
                continue;
            }

            match self.feed.fetch_latest(symbol).await {
                Ok(quote) if quote.price.is_finite() && quote.volume.is_finite() => {
                    self.prices.set(symbol, quote.price, quote.volume);
                    self.candles
                        .append(symbol, Timeframe::H1, Candle::flat(now, quote.price, quote.volume));
                    stats.fetched += 1;
                }
                Ok(quote) => {
                    warn!(symbol, price = quote.price, volume = quote.volume, "discarding non-finite quote");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(symbol, error = %e, "price fetch failed");
                    stats.failed += 1;
                }
            }
        }

        let swept = self.prices.evict_expired();
        debug!(swept, "price cache sweep");

        *self.last_stats.lock() = Some(stats);
        Ok(stats)
    }

    /// Backfill, then collect until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("market data collector started (1h, 4h, 1d)");
        self.backfill().await;

        loop {
            if shutdown::requested(&shutdown) {
                break;
            }

            let pause = match self.collect_once(chrono::Utc::now().timestamp()).await {
                Ok(stats) => {
                    info!(
                        symbols = stats.symbols,
                        fetched = stats.fetched,
                        cached = stats.cached,
                        failed = stats.failed,
                        "prices updated"
                    );
                    self.settings.interval
                }
                Err(e) => {
                    error!(error = %e, backoff_secs = self.settings.error_backoff.as_secs(), "collector cycle failed");
                    self.settings.error_backoff
                }
            };

            if shutdown::pause(pause, &mut shutdown).await {
                break;
            }
        }

        info!("market data collector stopped");
    }
}
