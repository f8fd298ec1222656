// =============================================================================
// Trend Classification
// =============================================================================
//
// Three independent votes per direction:
//   bullish: > 5 higher-high transitions in the last 10 highs,
//            RSI(14) > 50,
//            close above both EMA(50) and EMA(100)
//   bearish: mirror conditions (lower lows, RSI < 50, close below both EMAs)
//
// Two or more bullish votes => Bullish, else two or more bearish => Bearish,
// otherwise Neutral. Bullish wins ties by evaluation order.

use serde::Serialize;

use crate::indicators::ema::calculate_ema;
use crate::indicators::rsi::calculate_rsi;
use crate::market_data::Candle;
use crate::types::Trend;

const STRUCTURE_LOOKBACK: usize = 10;
const MIN_CANDLES: usize = 20;
const STRUCTURE_THRESHOLD: usize = 5;
pub const RSI_PERIOD: usize = 14;

/// Everything that went into a trend call, kept for logging.
#[derive(Debug, Clone, Serialize)]
pub struct TrendReading {
    pub trend: Trend,
    pub higher_highs: usize,
    pub lower_lows: usize,
    pub rsi: Option<f64>,
    pub bullish_votes: u8,
    pub bearish_votes: u8,
}

impl TrendReading {
    fn neutral() -> Self {
        Self {
            trend: Trend::Neutral,
            higher_highs: 0,
            lower_lows: 0,
            rsi: None,
            bullish_votes: 0,
            bearish_votes: 0,
        }
    }
}

pub fn read_trend(candles: &[Candle]) -> TrendReading {
    if candles.len() < MIN_CANDLES {
        return TrendReading::neutral();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let tail = &candles[candles.len() - STRUCTURE_LOOKBACK..];

    let higher_highs = tail.windows(2).filter(|w| w[1].high > w[0].high).count();
    let lower_lows = tail.windows(2).filter(|w| w[1].low < w[0].low).count();

    let Some(rsi) = calculate_rsi(&closes, RSI_PERIOD) else {
        return TrendReading::neutral();
    };

    let last_close = closes[closes.len() - 1];
    let emas = calculate_ema(&closes, 50).zip(calculate_ema(&closes, 100));

    let mut bullish_votes = 0u8;
    let mut bearish_votes = 0u8;

    if higher_highs > STRUCTURE_THRESHOLD {
        bullish_votes += 1;
    }
    if rsi > 50.0 {
        bullish_votes += 1;
    }
    if let Some((e50, e100)) = emas {
        if last_close > e50 && last_close > e100 {
            bullish_votes += 1;
        }
    }

    if lower_lows > STRUCTURE_THRESHOLD {
        bearish_votes += 1;
    }
    if rsi < 50.0 {
        bearish_votes += 1;
    }
    if let Some((e50, e100)) = emas {
        if last_close < e50 && last_close < e100 {
            bearish_votes += 1;
        }
    }

    let trend = if bullish_votes >= 2 {
        Trend::Bullish
    } else if bearish_votes >= 2 {
        Trend::Bearish
    } else {
        Trend::Neutral
    };

    TrendReading {
        trend,
        higher_highs,
        lower_lows,
        rsi: Some(rsi),
        bullish_votes,
        bearish_votes,
    }
}
