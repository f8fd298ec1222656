// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The recursion is seeded with the FIRST value of the window rather than an
// SMA warm-up. Trend votes depend on this exact seeding.
// =============================================================================

/// Final EMA value over `values`.
///
/// Returns `None` when `period == 0`, when fewer than `period` values are
/// supplied, or when the result is non-finite.
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let mut ema = values[0];
    for &v in &values[1..] {
        ema = v * multiplier + ema * (1.0 - multiplier);
    }

    ema.is_finite().then_some(ema)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_none());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn ema_seeded_with_first_value() {
        // period 3 => multiplier 0.5
        // seed 2, then 4 => 3, then 6 => 4.5
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3).unwrap();
        assert!((ema - 4.5).abs() < 1e-12);
    }

    #[test]
    fn ema_constant_series_is_constant() {
        let ema = calculate_ema(&vec![42.0; 120], 50).unwrap();
        assert!((ema - 42.0).abs() < 1e-9);
    }

    #[test]
    fn ema_lags_rising_series() {
        let values: Vec<f64> = (1..=120).map(|x| x as f64).collect();
        let e50 = calculate_ema(&values, 50).unwrap();
        let e100 = calculate_ema(&values, 100).unwrap();
        assert!(e50 < 120.0);
        assert!(e100 < e50);
    }

    #[test]
    fn ema_nan_input_yields_none() {
        assert!(calculate_ema(&[1.0, 2.0, f64::NAN, 4.0], 3).is_none());
    }
}
