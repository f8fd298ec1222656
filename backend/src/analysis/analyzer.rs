// =============================================================================
// Analyzer — single entry point from candle snapshots to a gated Signal
// =============================================================================
//
// Pipeline:
//   1. Check minimum history (1h >= 50, 4h >= 50, 1d >= 30)
//   2. Classify 4h and 1d trend
//   3. Find volume-confirmed key levels on 4h
//   4. Read RSI(14) on 1h and 4h, derive market context from the reference
//      symbol's 1h series
//   5. Evaluate LONG then SHORT; a side yields a candidate only when its full
//      condition set holds
//   6. Gate on `min_confidence`; LONG is returned first when both pass
//
// Pure: identical snapshots always produce identical output.
// =============================================================================

use thiserror::Error;
use tracing::debug;

use crate::analysis::levels::find_key_levels;
use crate::analysis::setup::{evaluate, MarketContext, SetupInputs};
use crate::analysis::signal::{build_signal, Signal, SignalContext};
use crate::analysis::trend::{read_trend, RSI_PERIOD};
use crate::indicators::rsi::calculate_rsi;
use crate::market_data::Candle;
use crate::types::{Side, Timeframe};

pub const MIN_CANDLES_1H: usize = 50;
pub const MIN_CANDLES_4H: usize = 50;
pub const MIN_CANDLES_1D: usize = 30;

/// Reference-symbol lookback for the market-context condition.
const CONTEXT_LOOKBACK_SECS: i64 = 24 * 3600;
/// Largest reference move (percent) that still counts as "not falling" /
/// "not pumping".
const CONTEXT_MAX_MOVE_PCT: f64 = 3.0;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("non-finite value in {timeframe} candle at t={timestamp}")]
    NonFinite { timeframe: Timeframe, timestamp: i64 },
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Signals scoring below this are discarded.
    pub min_confidence: u8,
    /// Evaluate the reference symbol instead of treating the market-context
    /// condition as always satisfied.
    pub market_context_filter: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 80,
            market_context_filter: false,
        }
    }
}

/// Candle snapshots for one symbol, plus the reference symbol's 1h series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesSet<'a> {
    pub candles_1h: &'a [Candle],
    pub candles_4h: &'a [Candle],
    pub candles_1d: &'a [Candle],
    pub market_1h: &'a [Candle],
}

pub fn has_enough_history(len_1h: usize, len_4h: usize, len_1d: usize) -> bool {
    len_1h >= MIN_CANDLES_1H && len_4h >= MIN_CANDLES_4H && len_1d >= MIN_CANDLES_1D
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Gated analysis: the first candidate (LONG before SHORT) meeting
    /// `min_confidence`, or `None`.
    pub fn analyze(&self, symbol: &str, series: &SeriesSet<'_>) -> Result<Option<Signal>, AnalysisError> {
        let candidates = self.candidates(symbol, series)?;
        for signal in candidates {
            if signal.confidence >= self.config.min_confidence {
                debug!(symbol, side = %signal.side, confidence = signal.confidence, "signal passed confidence gate");
                return Ok(Some(signal));
            }
            debug!(
                symbol,
                side = %signal.side,
                confidence = signal.confidence,
                min = self.config.min_confidence,
                "signal below confidence gate"
            );
        }
        Ok(None)
    }

    /// Ungated candidates for both sides, LONG first.
    pub fn candidates(&self, symbol: &str, series: &SeriesSet<'_>) -> Result<Vec<Signal>, AnalysisError> {
        if !has_enough_history(series.candles_1h.len(), series.candles_4h.len(), series.candles_1d.len()) {
            debug!(
                symbol,
                candles_1h = series.candles_1h.len(),
                candles_4h = series.candles_4h.len(),
                candles_1d = series.candles_1d.len(),
                "insufficient history"
            );
            return Ok(Vec::new());
        }

        ensure_finite(Timeframe::H1, series.candles_1h)?;
        ensure_finite(Timeframe::H4, series.candles_4h)?;
        ensure_finite(Timeframe::D1, series.candles_1d)?;

        let trend_4h = read_trend(series.candles_4h);
        let trend_1d = read_trend(series.candles_1d);
        let levels = find_key_levels(series.candles_4h);

        let closes_1h: Vec<f64> = series.candles_1h.iter().map(|c| c.close).collect();
        let closes_4h: Vec<f64> = series.candles_4h.iter().map(|c| c.close).collect();
        let rsi_1h = calculate_rsi(&closes_1h, RSI_PERIOD);
        let rsi_4h = calculate_rsi(&closes_4h, RSI_PERIOD);

        let current_price = closes_1h[closes_1h.len() - 1];
        let market = if self.config.market_context_filter {
            market_context(series.market_1h)
        } else {
            MarketContext::permissive()
        };

        let inputs = SetupInputs {
            current_price,
            rsi_1h,
            rsi_4h,
            candles_1h: series.candles_1h,
            market,
        };
        let context = SignalContext {
            trend_4h: trend_4h.trend,
            trend_1d: trend_1d.trend,
            rsi_1h,
            rsi_4h,
        };

        debug!(
            symbol,
            price = current_price,
            trend_4h = %trend_4h.trend,
            trend_1d = %trend_1d.trend,
            supports = levels.supports.len(),
            resistances = levels.resistances.len(),
            "analysis inputs ready"
        );

        let mut out = Vec::new();
        for (side, side_levels) in [(Side::Long, &levels.supports), (Side::Short, &levels.resistances)] {
            let Some(setup) = evaluate(side, side_levels, &inputs) else {
                continue;
            };
            if !setup.is_complete() {
                debug!(symbol, %side, met = setup.satisfied.len(), "setup incomplete");
                continue;
            }
            out.push(build_signal(symbol, side, current_price, setup.level, setup.satisfied, context));
        }
        Ok(out)
    }
}

fn ensure_finite(timeframe: Timeframe, candles: &[Candle]) -> Result<(), AnalysisError> {
    match candles.iter().find(|c| !c.is_finite()) {
        Some(bad) => Err(AnalysisError::NonFinite {
            timeframe,
            timestamp: bad.timestamp,
        }),
        None => Ok(()),
    }
}

/// Percent move of the reference symbol over the last 24h, judged by candle
/// timestamps (the 1h series also carries synthetic intra-hour candles).
/// Too little history reads as permissive.
pub fn market_context(market_1h: &[Candle]) -> MarketContext {
    let Some(last) = market_1h.last() else {
        return MarketContext::permissive();
    };
    let cutoff = last.timestamp - CONTEXT_LOOKBACK_SECS;
    let Some(base) = market_1h.iter().rev().find(|c| c.timestamp <= cutoff) else {
        return MarketContext::permissive();
    };
    if base.close <= 0.0 {
        return MarketContext::permissive();
    }

    let change_pct = (last.close - base.close) / base.close * 100.0;
    MarketContext {
        not_falling: change_pct >= -CONTEXT_MAX_MOVE_PCT,
        not_pumping: change_pct <= CONTEXT_MAX_MOVE_PCT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures;
    use crate::types::Condition;

    fn flat_series(n: usize, price: f64, step_secs: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64 * step_secs, price, price * 1.001, price * 0.999, price, 100.0))
            .collect()
    }

    #[test]
    fn insufficient_history_is_absent_for_any_content() {
        let analyzer = Analyzer::default();
        let h1 = flat_series(49, 100.0, 3600);
        let h4 = flat_series(80, 100.0, 14_400);
        let d1 = flat_series(40, 100.0, 86_400);
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &[],
        };
        assert_eq!(analyzer.analyze("ABCUSDT", &set), Ok(None));

        let h1 = flat_series(60, 100.0, 3600);
        let d1_short = flat_series(29, 100.0, 86_400);
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1_short,
            market_1h: &[],
        };
        assert_eq!(analyzer.analyze("ABCUSDT", &set), Ok(None));
    }

    #[test]
    fn non_finite_input_is_an_error() {
        let analyzer = Analyzer::default();
        let mut h1 = flat_series(60, 100.0, 3600);
        h1[10].close = f64::NAN;
        let h4 = flat_series(60, 100.0, 14_400);
        let d1 = flat_series(40, 100.0, 86_400);
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &[],
        };
        assert_eq!(
            analyzer.analyze("ABCUSDT", &set),
            Err(AnalysisError::NonFinite {
                timeframe: Timeframe::H1,
                timestamp: 36_000
            })
        );
    }

    #[test]
    fn flat_market_produces_no_signal() {
        let analyzer = Analyzer::default();
        let h1 = flat_series(100, 100.0, 3600);
        let h4 = flat_series(100, 100.0, 14_400);
        let d1 = flat_series(40, 100.0, 86_400);
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &h1,
        };
        assert_eq!(analyzer.candidates("ABCUSDT", &set), Ok(Vec::new()));
    }

    #[test]
    fn analysis_is_pure() {
        let analyzer = Analyzer::default();
        let h1 = fixtures::fading_1h();
        let h4 = fixtures::supported_4h();
        let d1 = fixtures::flat_1d();
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &h1,
        };
        let first = analyzer.analyze("ABCUSDT", &set);
        let second = analyzer.analyze("ABCUSDT", &set);
        assert_eq!(first, second);
    }

    #[test]
    fn emitted_signals_always_carry_full_condition_sets() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            min_confidence: 0,
            market_context_filter: false,
        });
        let h1 = fixtures::fading_1h();
        let h4 = fixtures::supported_4h();
        let d1 = fixtures::flat_1d();
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &[],
        };
        for signal in analyzer.candidates("ABCUSDT", &set).unwrap() {
            assert_eq!(signal.confidence, 100);
            let required: Vec<Condition> = Condition::required_for(signal.side).to_vec();
            assert!(required.iter().all(|c| signal.satisfied_conditions.contains(c)));
        }
    }

    #[test]
    fn long_at_proven_floor() {
        let analyzer = Analyzer::default();
        let h1 = fixtures::fading_1h();
        let h4 = fixtures::supported_4h();
        let d1 = fixtures::flat_1d();
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &[],
        };
        let signal = analyzer.analyze("ABCUSDT", &set).unwrap().unwrap();
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.confidence, 100);
        assert!((signal.reference_level - fixtures::FLOOR).abs() < 1e-9);
        assert!((signal.current_price - fixtures::LAST_PRICE_1H).abs() < 1e-9);
        assert!((signal.entry_zone.0 - 99.5).abs() < 1e-9);
        assert!((signal.stop_loss - 98.5).abs() < 1e-9);
        let rsi_1h = signal.context.rsi_1h.unwrap();
        assert!((rsi_1h - 40.0).abs() < 1e-6);
        assert!((signal.context.rsi_4h.unwrap() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn falling_market_blocks_long_when_filter_enabled() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            min_confidence: 80,
            market_context_filter: true,
        });
        let h1 = fixtures::fading_1h();
        let h4 = fixtures::supported_4h();
        let d1 = fixtures::flat_1d();

        let mut market = flat_series(30, 100.0, 3600);
        let last = market.len() - 1;
        market[last].close = 95.0;
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &market,
        };
        assert_eq!(analyzer.analyze("ABCUSDT", &set), Ok(None));

        // A calm reference symbol lets it through.
        let calm = flat_series(30, 100.0, 3600);
        let set = SeriesSet { market_1h: &calm, ..set };
        assert!(analyzer.analyze("ABCUSDT", &set).unwrap().is_some());
    }

    #[test]
    fn gate_discards_low_confidence() {
        // A gate above 100 can never be met.
        let analyzer = Analyzer::new(AnalyzerConfig {
            min_confidence: 101,
            market_context_filter: false,
        });
        let h1 = fixtures::fading_1h();
        let h4 = fixtures::supported_4h();
        let d1 = fixtures::flat_1d();
        let set = SeriesSet {
            candles_1h: &h1,
            candles_4h: &h4,
            candles_1d: &d1,
            market_1h: &[],
        };
        assert_eq!(analyzer.analyze("ABCUSDT", &set), Ok(None));
    }

    #[test]
    fn market_context_from_reference_move() {
        let mut falling = flat_series(30, 100.0, 3600);
        let last = falling.len() - 1;
        falling[last].close = 95.0;
        let ctx = market_context(&falling);
        assert!(!ctx.not_falling);
        assert!(ctx.not_pumping);

        let mut pumping = flat_series(30, 100.0, 3600);
        pumping[last].close = 104.0;
        let ctx = market_context(&pumping);
        assert!(ctx.not_falling);
        assert!(!ctx.not_pumping);

        // Less than a day of history never blocks.
        assert_eq!(market_context(&falling[20..]), MarketContext::permissive());
        assert_eq!(market_context(&[]), MarketContext::permissive());
    }
}
