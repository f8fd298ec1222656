// =============================================================================
// Collaborator seams — market data, subscribers, signal log, delivery
// =============================================================================
//
// The collector and dispatcher only see these traits. Production wires in
// the Binance client, the JSON store, and the Telegram notifier; tests wire
// in in-memory fakes.
// =============================================================================

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market_data::Candle;
use crate::types::{Side, Timeframe};

/// Latest price and 24h volume for a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub volume: f64,
}

#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn fetch_latest(&self, symbol: &str) -> Result<Quote>;

    /// Up to `limit` most recent candles, oldest first.
    async fn fetch_history(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// `(symbol, subscriber_id)` rows for paid subscribers only.
    async fn list_symbols_with_subscribers(&self) -> Result<Vec<(String, i64)>>;

    /// Every symbol anyone tracks, paid or not.
    async fn list_globally_tracked_symbols(&self) -> Result<HashSet<String>>;
}

/// One successful delivery, as written to the signal log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub subscriber_id: i64,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub confidence: u8,
    /// UNIX seconds.
    pub timestamp: i64,
}

#[async_trait]
pub trait SignalLog: Send + Sync {
    async fn record_dispatched_signal(&self, record: DispatchRecord) -> Result<()>;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeliveryError {
    /// The channel asked us to back off for `retry_after`.
    #[error("delivery throttled, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },
    #[error("delivery failed: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, subscriber_id: i64, message: &str) -> Result<(), DeliveryError>;
}
