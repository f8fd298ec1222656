// =============================================================================
// Signal Dispatch Scheduler
// =============================================================================
//
// Every `interval`:
//   1. Ask the directory for (symbol, subscriber) rows of paid subscribers.
//   2. Per distinct symbol: skip on cooldown, skip on daily cap, skip on thin
//      history, otherwise analyze against the reference symbol's 1h series.
//   3. On a signal: render once, deliver to each subscriber in turn with a
//      short pause, log every successful delivery, then mark the symbol as
//      dispatched no matter how many deliveries succeeded.
//
// A failing cycle is logged and the next tick proceeds.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analysis::{has_enough_history, Analyzer, SeriesSet};
use crate::dispatch::delivery::{deliver_with_retry, RetryPolicy};
use crate::dispatch::guard::{DispatchGuard, Eligibility};
use crate::interfaces::{DispatchRecord, Notifier, SignalLog, SubscriberDirectory};
use crate::market_data::CandleStore;
use crate::render;
use crate::runtime_config::RelayConfig;
use crate::shutdown;
use crate::types::Timeframe;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub interval: Duration,
    pub startup_delay: Duration,
    pub send_throttle: Duration,
    pub retry: RetryPolicy,
    pub default_symbols: Vec<String>,
    pub reference_symbol: String,
}

impl DispatcherSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.dispatch_interval_secs),
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            send_throttle: Duration::from_millis(config.send_throttle_ms),
            retry: RetryPolicy::from_config(config),
            default_symbols: config.default_symbols.clone(),
            reference_symbol: config.reference_symbol.clone(),
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub symbols: usize,
    pub analyzed: usize,
    pub skipped_cooldown: usize,
    pub skipped_daily_cap: usize,
    pub skipped_history: usize,
    pub analysis_errors: usize,
    pub signals: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Running totals since startup, for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchTotals {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub signals: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
    pub last_cycle_at: Option<i64>,
    pub last_report: Option<CycleReport>,
}

pub struct Dispatcher {
    directory: Arc<dyn SubscriberDirectory>,
    signal_log: Arc<dyn SignalLog>,
    notifier: Arc<dyn Notifier>,
    candles: Arc<CandleStore>,
    guard: Arc<DispatchGuard>,
    analyzer: Analyzer,
    settings: DispatcherSettings,
    totals: Mutex<DispatchTotals>,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        signal_log: Arc<dyn SignalLog>,
        notifier: Arc<dyn Notifier>,
        candles: Arc<CandleStore>,
        guard: Arc<DispatchGuard>,
        analyzer: Analyzer,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            directory,
            signal_log,
            notifier,
            candles,
            guard,
            analyzer,
            settings,
            totals: Mutex::new(DispatchTotals::default()),
        }
    }

    pub fn totals(&self) -> DispatchTotals {
        self.totals.lock().clone()
    }

    /// Log per-timeframe candle counts for the default pairs and the
    /// reference symbol.
    pub fn log_data_availability(&self) {
        info!("checking data availability");
        for symbol in &self.settings.default_symbols {
            info!(
                symbol = %symbol,
                candles_1h = self.candles.len(symbol, Timeframe::H1),
                candles_4h = self.candles.len(symbol, Timeframe::H4),
                candles_1d = self.candles.len(symbol, Timeframe::D1),
                "series depth"
            );
        }
        info!(
            symbol = %self.settings.reference_symbol,
            candles_1h = self.candles.len(&self.settings.reference_symbol, Timeframe::H1),
            "reference series depth"
        );
    }

    /// One dispatch cycle at `now` (UNIX seconds).
    pub async fn run_cycle(&self, now: i64) -> Result<CycleReport> {
        let rows = self
            .directory
            .list_symbols_with_subscribers()
            .await
            .context("failed to list subscribed symbols")?;

        let mut by_symbol: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (symbol, subscriber_id) in rows {
            let subs = by_symbol.entry(symbol).or_default();
            if !subs.contains(&subscriber_id) {
                subs.push(subscriber_id);
            }
        }

        let mut report = CycleReport {
            symbols: by_symbol.len(),
            ..CycleReport::default()
        };

        if by_symbol.is_empty() {
            warn!("no paid subscribers with tracked pairs");
            return Ok(report);
        }

        let market_1h = self.candles.read(&self.settings.reference_symbol, Timeframe::H1);

        for (symbol, subscribers) in &by_symbol {
            match self.guard.check(symbol, now) {
                Eligibility::Eligible => {}
                Eligibility::CoolingDown { remaining_secs } => {
                    debug!(symbol = %symbol, remaining_mins = remaining_secs / 60, "cooldown active");
                    report.skipped_cooldown += 1;
                    continue;
                }
                Eligibility::DailyCapReached { sent_today } => {
                    debug!(symbol = %symbol, sent_today, "daily signal cap reached");
                    report.skipped_daily_cap += 1;
                    continue;
                }
            }

            let candles_1h = self.candles.read(symbol, Timeframe::H1);
            let candles_4h = self.candles.read(symbol, Timeframe::H4);
            let candles_1d = self.candles.read(symbol, Timeframe::D1);
            if !has_enough_history(candles_1h.len(), candles_4h.len(), candles_1d.len()) {
                debug!(
                    symbol = %symbol,
                    candles_1h = candles_1h.len(),
                    candles_4h = candles_4h.len(),
                    candles_1d = candles_1d.len(),
                    "not enough candles for analysis"
                );
                report.skipped_history += 1;
                continue;
            }

            report.analyzed += 1;
            let series = SeriesSet {
                candles_1h: &candles_1h,
                candles_4h: &candles_4h,
                candles_1d: &candles_1d,
                market_1h: &market_1h,
            };
            let signal = match self.analyzer.analyze(symbol, &series) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "analysis failed, skipping symbol");
                    report.analysis_errors += 1;
                    continue;
                }
            };

            report.signals += 1;
            info!(
                symbol = %symbol,
                side = %signal.side,
                confidence = signal.confidence,
                price = signal.current_price,
                level = signal.reference_level,
                "signal found"
            );

            let message = render::format_signal(&signal);
            let mut sent = 0usize;
            for (i, &subscriber_id) in subscribers.iter().enumerate() {
                match deliver_with_retry(self.notifier.as_ref(), subscriber_id, &message, self.settings.retry).await {
                    Ok(_) => {
                        sent += 1;
                        let record = DispatchRecord {
                            subscriber_id,
                            symbol: symbol.clone(),
                            side: signal.side,
                            price: signal.current_price,
                            confidence: signal.confidence,
                            timestamp: now,
                        };
                        if let Err(e) = self.signal_log.record_dispatched_signal(record).await {
                            warn!(symbol = %symbol, subscriber_id, error = %e, "failed to log dispatched signal");
                        }
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, subscriber_id, error = %e, "delivery failed");
                        report.failed += 1;
                    }
                }
                if i + 1 < subscribers.len() && !self.settings.send_throttle.is_zero() {
                    tokio::time::sleep(self.settings.send_throttle).await;
                }
            }
            report.delivered += sent;

            self.guard.record_dispatch(symbol, now);
            info!(symbol = %symbol, sent, subscribers = subscribers.len(), "signal dispatched");
        }

        Ok(report)
    }

    fn record_totals(&self, now: i64, outcome: Option<&CycleReport>) {
        let mut t = self.totals.lock();
        t.cycles += 1;
        t.last_cycle_at = Some(now);
        match outcome {
            Some(report) => {
                t.signals += report.signals as u64;
                t.delivered += report.delivered as u64;
                t.failed_deliveries += report.failed as u64;
                t.last_report = Some(*report);
            }
            None => t.failed_cycles += 1,
        }
    }

    /// Wait for the startup delay, log data depth, then run cycles until
    /// shutdown. A cycle in progress always completes.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            min_confidence = self.analyzer.config().min_confidence,
            interval_secs = self.settings.interval.as_secs(),
            "signal dispatcher started"
        );

        if shutdown::pause(self.settings.startup_delay, &mut shutdown).await {
            info!("signal dispatcher stopped before first cycle");
            return;
        }
        self.log_data_availability();

        loop {
            if shutdown::requested(&shutdown) {
                break;
            }

            let now = chrono::Utc::now().timestamp();
            match self.run_cycle(now).await {
                Ok(report) => {
                    self.record_totals(now, Some(&report));
                    info!(
                        symbols = report.symbols,
                        analyzed = report.analyzed,
                        signals = report.signals,
                        delivered = report.delivered,
                        "dispatch cycle complete"
                    );
                    if report.analyzed > 0 && report.signals == 0 {
                        info!(min_confidence = self.analyzer.config().min_confidence, "no qualifying signals this cycle");
                    }
                }
                Err(e) => {
                    self.record_totals(now, None);
                    error!(error = %e, "dispatch cycle failed");
                }
            }

            if shutdown::pause(self.settings.interval, &mut shutdown).await {
                break;
            }
        }

        info!("signal dispatcher stopped");
    }
}
