// =============================================================================
// Directional Setup Evaluation
// =============================================================================
//
// LONG is judged against the highest support no more than 1.5 % below price,
// SHORT against the lowest resistance no more than 1.5 % above it. Each side
// then checks its five named conditions.

use std::collections::BTreeSet;

use crate::market_data::Candle;
use crate::types::{Condition, Side};

const LEVEL_PROXIMITY: f64 = 0.015;
const VOLUME_WINDOW: usize = 5;
const MIN_VOLUME_HISTORY: usize = 10;
const MIN_COUNTER_CANDLES: usize = 2;

/// Market-wide context derived from the reference symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketContext {
    pub not_falling: bool,
    pub not_pumping: bool,
}

impl MarketContext {
    /// Context that never blocks a setup.
    pub fn permissive() -> Self {
        Self {
            not_falling: true,
            not_pumping: true,
        }
    }
}

/// Readings a side needs besides its reference level.
#[derive(Debug, Clone, Copy)]
pub struct SetupInputs<'a> {
    pub current_price: f64,
    pub rsi_1h: Option<f64>,
    pub rsi_4h: Option<f64>,
    pub candles_1h: &'a [Candle],
    pub market: MarketContext,
}

/// A level that qualified for a side together with the conditions it met.
#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    pub side: Side,
    pub level: f64,
    pub satisfied: BTreeSet<Condition>,
}

impl Setup {
    /// Whether every condition the side requires is satisfied.
    pub fn is_complete(&self) -> bool {
        Condition::required_for(self.side)
            .iter()
            .all(|c| self.satisfied.contains(c))
    }
}

pub fn nearest_support(price: f64, supports: &[f64]) -> Option<f64> {
    supports
        .iter()
        .copied()
        .filter(|&s| s < price && (price - s) / price <= LEVEL_PROXIMITY)
        .max_by(f64::total_cmp)
}

pub fn nearest_resistance(price: f64, resistances: &[f64]) -> Option<f64> {
    resistances
        .iter()
        .copied()
        .filter(|&r| r > price && (r - price) / price <= LEVEL_PROXIMITY)
        .min_by(f64::total_cmp)
}

/// Evaluate one side. `None` when there is no qualifying level at all.
pub fn evaluate(side: Side, levels: &[f64], inputs: &SetupInputs<'_>) -> Option<Setup> {
    let price = inputs.current_price;
    let level = match side {
        Side::Long => nearest_support(price, levels)?,
        Side::Short => nearest_resistance(price, levels)?,
    };

    let [at_level, level_works, rsi_turn, volume_fade, market_ok] = *Condition::required_for(side);
    let mut satisfied = BTreeSet::new();

    if (price - level).abs() / level <= LEVEL_PROXIMITY {
        satisfied.insert(at_level);
    }

    // Every level that reaches this point was volume-confirmed upstream.
    satisfied.insert(level_works);

    if let (Some(rsi_1h), Some(rsi_4h)) = (inputs.rsi_1h, inputs.rsi_4h) {
        let turning = match side {
            Side::Long => (30.0..=45.0).contains(&rsi_1h) && rsi_1h > rsi_4h,
            Side::Short => (55.0..=70.0).contains(&rsi_1h) && rsi_1h < rsi_4h,
        };
        if turning {
            satisfied.insert(rsi_turn);
        }
    }

    if volume_fading(side, inputs.candles_1h) {
        satisfied.insert(volume_fade);
    }

    let market_allows = match side {
        Side::Long => inputs.market.not_falling,
        Side::Short => inputs.market.not_pumping,
    };
    if market_allows {
        satisfied.insert(market_ok);
    }

    Some(Setup {
        side,
        level,
        satisfied,
    })
}

/// Among the last five candles, at least two counter-trend candles (red for
/// LONG, green for SHORT) whose volume shrinks from the first to the last.
pub fn volume_fading(side: Side, candles: &[Candle]) -> bool {
    if candles.len() < MIN_VOLUME_HISTORY {
        return false;
    }

    let recent = &candles[candles.len() - VOLUME_WINDOW..];
    let counter: Vec<f64> = recent
        .iter()
        .filter(|c| match side {
            Side::Long => c.is_bearish(),
            Side::Short => c.is_bullish(),
        })
        .map(|c| c.volume)
        .collect();

    match (counter.first(), counter.last()) {
        (Some(first), Some(last)) if counter.len() >= MIN_COUNTER_CANDLES => last < first,
        _ => false,
    }
}
