// =============================================================================
// Key Level Detection — volume-confirmed support / resistance
// =============================================================================
//
// For every interior 4h candle (skipping the first 20 and the last 10) the low
// is a support candidate and the high a resistance candidate. A candidate is
// confirmed when, inside a ±30 candle window, at least two other candles touch
// it within 2 % on above-average volume (volume above the mean of the five
// preceding candles).
//
// Confirmed supports below the last close and resistances above it survive.
// Anything farther than 10 % from the close is dropped, the rest is sorted and
// clustered: a value joins the open cluster while it sits within 2 % of the
// cluster's first member; each cluster collapses to its mean.

use serde::Serialize;

use crate::market_data::Candle;

pub const MIN_CANDLES: usize = 50;
const SKIP_HEAD: usize = 20;
const SKIP_TAIL: usize = 10;
const WINDOW: usize = 30;
const TOUCH_TOLERANCE: f64 = 0.02;
const MIN_TOUCHES: usize = 2;
const VOLUME_LOOKBACK: usize = 5;
const MAX_DISTANCE: f64 = 0.10;
const CLUSTER_TOLERANCE: f64 = 0.02;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyLevels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

pub fn find_key_levels(candles: &[Candle]) -> KeyLevels {
    if candles.len() < MIN_CANDLES {
        return KeyLevels::default();
    }

    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let current = candles[candles.len() - 1].close;

    let mut supports = Vec::new();
    let mut resistances = Vec::new();

    for i in SKIP_HEAD..candles.len() - SKIP_TAIL {
        if lows[i] < current && is_confirmed(&lows, &volumes, i) {
            supports.push(lows[i]);
        }
        if highs[i] > current && is_confirmed(&highs, &volumes, i) {
            resistances.push(highs[i]);
        }
    }

    KeyLevels {
        supports: cluster_levels(supports, current),
        resistances: cluster_levels(resistances, current),
    }
}

/// Count volume-backed touches of `values[i]` by other candles in the window.
fn is_confirmed(values: &[f64], volumes: &[f64], i: usize) -> bool {
    let candidate = values[i];
    if candidate <= 0.0 || !candidate.is_finite() {
        return false;
    }

    let start = i.saturating_sub(WINDOW);
    let end = (i + WINDOW).min(values.len());

    let touches = (start..end)
        .filter(|&j| j != i)
        .filter(|&j| (values[j] - candidate).abs() / candidate <= TOUCH_TOLERANCE)
        .filter(|&j| volume_above_recent_mean(volumes, j))
        .count();

    touches >= MIN_TOUCHES
}

/// `volumes[j]` strictly above the mean of up to five preceding volumes.
/// The first candle has no history and never qualifies.
fn volume_above_recent_mean(volumes: &[f64], j: usize) -> bool {
    let prior = &volumes[j.saturating_sub(VOLUME_LOOKBACK)..j];
    if prior.is_empty() {
        return false;
    }
    let mean = prior.iter().sum::<f64>() / prior.len() as f64;
    volumes[j] > mean
}

/// Distance filter, sort, and greedy clustering around each cluster's head.
pub fn cluster_levels(levels: Vec<f64>, current_price: f64) -> Vec<f64> {
    if current_price <= 0.0 {
        return Vec::new();
    }

    let mut near: Vec<f64> = levels
        .into_iter()
        .filter(|l| (l - current_price).abs() / current_price <= MAX_DISTANCE)
        .collect();
    near.sort_by(f64::total_cmp);

    let mut grouped = Vec::new();
    let mut cluster: Vec<f64> = Vec::new();

    for level in near {
        match cluster.first() {
            Some(&head) if (level - head).abs() / head <= CLUSTER_TOLERANCE => cluster.push(level),
            Some(_) => {
                grouped.push(mean(&cluster));
                cluster = vec![level];
            }
            None => cluster.push(level),
        }
    }
    if !cluster.is_empty() {
        grouped.push(mean(&cluster));
    }

    grouped
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
