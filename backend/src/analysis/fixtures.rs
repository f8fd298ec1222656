//! Candle series that reliably produce a complete LONG setup.
//!
//! 4h: volume spikes every ten candles wick down to a 100 floor; the last
//! fourteen closes chop lower (+0.1 / -0.3) for an RSI of 25.
//! 1h: drifts from 101.2 to 100.8 with an RSI of 40; the last five candles
//! hold two red candles on volumes 120 then 80.
//! 1d: flat.

use crate::market_data::Candle;

pub const FLOOR: f64 = 100.0;
pub const LAST_PRICE_1H: f64 = 100.8;

pub fn supported_4h() -> Vec<Candle> {
    let mut candles = Vec::with_capacity(80);
    let mut prev_close: f64 = 104.0;
    for i in 0..80usize {
        let t = i as i64 * 14_400;
        let spike = i % 10 == 5;
        let candle = if i < 66 {
            if spike {
                Candle::new(t, 104.0, 105.0, FLOOR, 104.0, 50.0)
            } else if i % 2 == 0 {
                Candle::new(t, 104.0, 105.0, 103.0, 104.5, 10.0)
            } else {
                Candle::new(t, 104.5, 105.0, 103.0, 104.0, 10.0)
            }
        } else {
            let close = if i % 2 == 0 { prev_close + 0.1 } else { prev_close - 0.3 };
            let high = prev_close.max(close) + 0.1;
            let (low, volume) = if spike {
                (FLOOR, 50.0)
            } else {
                (prev_close.min(close) - 0.3, 10.0)
            };
            Candle::new(t, prev_close, high, low, close, volume)
        };
        prev_close = candle.close;
        candles.push(candle);
    }
    candles
}

pub fn fading_1h() -> Vec<Candle> {
    const STEPS: [f64; 14] = [
        0.2, -0.2, 0.2, -0.2, 0.2, -0.2, 0.2, -0.2, 0.0, 0.0, -0.2, 0.0, -0.2, 0.0,
    ];
    let mut candles: Vec<Candle> = (0..46).map(|i| Candle::flat(i * 3600, 101.2, 100.0)).collect();
    let mut prev_close: f64 = 101.2;
    for (k, step) in STEPS.iter().enumerate() {
        let i = 46 + k;
        let close = prev_close + step;
        let volume = match i {
            56 => 120.0,
            58 => 80.0,
            _ => 100.0,
        };
        candles.push(Candle::new(
            i as i64 * 3600,
            prev_close,
            prev_close.max(close) + 0.05,
            prev_close.min(close) - 0.05,
            close,
            volume,
        ));
        prev_close = close;
    }
    candles
}

pub fn flat_1d() -> Vec<Candle> {
    (0..40).map(|i| Candle::flat(i * 86_400, 103.0, 1_000.0)).collect()
}
