use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV bar. `timestamp` is the bar open time in UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Zero-width candle built from a single price observation.
    pub fn flat(timestamp: i64, price: f64, volume: f64) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// `close < open`
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// `close > open`
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// CandleStore -- bounded FIFO buffer per (symbol, timeframe)
// ---------------------------------------------------------------------------

/// Thread-safe store holding the most recent candles per `(symbol, timeframe)`.
///
/// Every series is append-only and trimmed to `capacity`; the oldest candle is
/// discarded first. A single lock guards the whole store, and no lock is ever
/// held across an await point, so the collector and the dispatcher may share
/// one instance through an `Arc`.
pub struct CandleStore {
    series: RwLock<HashMap<SeriesKey, VecDeque<Candle>>>,
    capacity: usize,
}

impl CandleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a candle, evicting the oldest one if the series is full.
    pub fn append(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let mut map = self.series.write();
        let ring = map
            .entry(SeriesKey::new(symbol, timeframe))
            .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));
        ring.push_back(candle);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Append a batch in the given (chronological) order under one lock.
    pub fn extend(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) {
        let mut map = self.series.write();
        let ring = map
            .entry(SeriesKey::new(symbol, timeframe))
            .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));
        for candle in candles {
            ring.push_back(*candle);
        }
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Snapshot of the series, oldest first. Later appends are not reflected.
    pub fn read(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let map = self.series.read();
        map.get(&SeriesKey::new(symbol, timeframe))
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let map = self.series.read();
        map.get(&SeriesKey::new(symbol, timeframe))
            .map_or(0, VecDeque::len)
    }

    /// Candle counts for every series, sorted by key for stable output.
    pub fn series_counts(&self) -> Vec<(SeriesKey, usize)> {
        let map = self.series.read();
        let mut counts: Vec<(SeriesKey, usize)> =
            map.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        counts.sort_by(|a, b| {
            a.0.symbol
                .cmp(&b.0.symbol)
                .then_with(|| a.0.timeframe.as_str().cmp(b.0.timeframe.as_str()))
        });
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
