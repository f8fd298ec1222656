// =============================================================================
// Central Application State — Signal Relay
// =============================================================================
//
// Ties the shared stores and the two loops together for `main` and the
// status API. Every subsystem manages its own interior mutability; AppState
// only holds `Arc`s and builds the read-only status snapshot.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::binance::rate_limit::{RateLimitSnapshot, RateLimitTracker};
use crate::dispatch::{DispatchGuard, DispatchTotals, Dispatcher, GuardSnapshot};
use crate::interfaces::DispatchRecord;
use crate::market_data::collector::{CollectStats, Collector};
use crate::market_data::{CandleStore, PriceCache};
use crate::runtime_config::RelayConfig;
use crate::store::JsonStore;

/// Log entries shown on `/api/v1/status`.
const STATUS_RECENT_SIGNALS: usize = 20;

pub struct AppState {
    pub config: RelayConfig,
    pub candles: Arc<CandleStore>,
    pub prices: Arc<PriceCache>,
    pub guard: Arc<DispatchGuard>,
    pub store: Arc<JsonStore>,
    pub collector: Arc<Collector>,
    pub dispatcher: Arc<Dispatcher>,
    pub rate_limit: Arc<RateLimitTracker>,
    /// Instant when the relay was started. Used for uptime.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn build_status(&self) -> StatusSnapshot {
        let series = self
            .candles
            .series_counts()
            .into_iter()
            .map(|(key, candles)| SeriesStatus {
                symbol: key.symbol,
                timeframe: key.timeframe.as_str(),
                candles,
            })
            .collect();

        StatusSnapshot {
            server_time: chrono::Utc::now().timestamp(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            reference_symbol: self.config.reference_symbol.clone(),
            min_confidence: self.config.min_confidence,
            series_capacity: self.candles.capacity(),
            series,
            cached_prices: self.prices.len(),
            collector: self.collector.last_stats(),
            guard: self.guard.snapshot(),
            dispatch: self.dispatcher.totals(),
            recent_signals: self.store.recent_signals(STATUS_RECENT_SIGNALS),
            rate_limit: self.rate_limit.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesStatus {
    pub symbol: String,
    pub timeframe: &'static str,
    pub candles: usize,
}

/// Payload of `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub server_time: i64,
    pub uptime_secs: u64,
    pub reference_symbol: String,
    pub min_confidence: u8,
    pub series_capacity: usize,
    pub series: Vec<SeriesStatus>,
    pub cached_prices: usize,
    pub collector: Option<CollectStats>,
    pub guard: GuardSnapshot,
    pub dispatch: DispatchTotals,
    /// Newest first.
    pub recent_signals: Vec<DispatchRecord>,
    pub rate_limit: RateLimitSnapshot,
}
