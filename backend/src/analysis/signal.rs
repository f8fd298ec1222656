// =============================================================================
// Signal Construction & Scoring
// =============================================================================
//
// Price levels are pure functions of (side, current_price, reference_level):
//
//   LONG   entry  [level -0.5 %, level +1.5 %]   stop level -1.5 %
//   SHORT  entry  [level -1.5 %, level +0.5 %]   stop level +1.5 %
//
//   take-profits are offsets from the CURRENT price, not the level:
//   TP1 ±2.5 %, TP2 ±6 %, TP3 ±11 % (sign per side)
//
// Confidence = 20 per satisfied condition, +10 when all five hold, cap 100.
// =============================================================================

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{Condition, PositionSize, Side, Trend};

const POINTS_PER_CONDITION: u32 = 20;
const FULL_SET_BONUS: u32 = 10;
const FULL_SET: usize = 5;

/// A fully specified trade idea. Built fresh per analysis and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entry_zone: (f64, f64),
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    pub confidence: u8,
    pub position_size: PositionSize,
    pub satisfied_conditions: BTreeSet<Condition>,
    pub current_price: f64,
    pub reference_level: f64,
    pub context: SignalContext,
}

/// Informational readings carried along for rendering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalContext {
    pub trend_4h: Trend,
    pub trend_1d: Trend,
    pub rsi_1h: Option<f64>,
    pub rsi_4h: Option<f64>,
}

impl Default for SignalContext {
    fn default() -> Self {
        Self {
            trend_4h: Trend::Neutral,
            trend_1d: Trend::Neutral,
            rsi_1h: None,
            rsi_4h: None,
        }
    }
}

pub fn confidence_for(satisfied: usize) -> u8 {
    let mut score = satisfied as u32 * POINTS_PER_CONDITION;
    if satisfied == FULL_SET {
        score += FULL_SET_BONUS;
    }
    score.min(100) as u8
}

pub fn entry_and_stop(side: Side, level: f64) -> ((f64, f64), f64) {
    match side {
        Side::Long => ((level * 0.995, level * 1.015), level * 0.985),
        Side::Short => ((level * 0.985, level * 1.005), level * 1.015),
    }
}

pub fn take_profits(side: Side, current_price: f64) -> (f64, f64, f64) {
    match side {
        Side::Long => (
            current_price * 1.025,
            current_price * 1.06,
            current_price * 1.11,
        ),
        Side::Short => (
            current_price * 0.975,
            current_price * 0.94,
            current_price * 0.89,
        ),
    }
}

pub fn build_signal(
    symbol: &str,
    side: Side,
    current_price: f64,
    reference_level: f64,
    satisfied_conditions: BTreeSet<Condition>,
    context: SignalContext,
) -> Signal {
    let count = satisfied_conditions.len();
    let (entry_zone, stop_loss) = entry_and_stop(side, reference_level);
    let (take_profit_1, take_profit_2, take_profit_3) = take_profits(side, current_price);

    Signal {
        symbol: symbol.to_string(),
        side,
        entry_zone,
        stop_loss,
        take_profit_1,
        take_profit_2,
        take_profit_3,
        confidence: confidence_for(count),
        position_size: PositionSize::from_condition_count(count),
        satisfied_conditions,
        current_price,
        reference_level,
        context,
    }
}
