// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
///
/// # Edge cases
/// - `period == 0` => empty vec (division by zero guard)
/// - `closes.len() < period` => empty vec
/// - Non-finite intermediate values are skipped; the computation resets.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let divisor = (period + 1) as f64;
    // Guard against degenerate (should never happen with period >= 1, but be safe).
    if divisor == 0.0 {
        return Vec::new();
    }
    let multiplier = 2.0 / divisor;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            // If we hit a non-finite value, stop producing further results —
            // downstream consumers should not trust a broken series.
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Compute an `ema_N` raw bundle and normalized signal for the registry.
///
/// `pct` is the percentage distance of the latest close from the EMA. Inside
/// `±neutral_pct` the signal ramps linearly to ±0.3; beyond it, the signal
/// continues ramping from 0.3 towards ±1.0 over the next `neutral_pct * 3`
/// percentage points before saturating.
pub fn compute(closes: &[f64], period: usize, neutral_pct: f64) -> (serde_json::Value, f64) {
    let series = calculate_ema(closes, period);

    let (Some(&ema), Some(&price)) = (series.last(), closes.last()) else {
        return (
            serde_json::json!({ "ema": null, "price": null, "period": period }),
            f64::NAN,
        );
    };

    if ema == 0.0 {
        return (
            serde_json::json!({ "ema": ema, "price": price, "period": period }),
            f64::NAN,
        );
    }

    let pct = (price - ema) / ema * 100.0;
    let sign = if pct >= 0.0 { 1.0 } else { -1.0 };

    let signal = if pct.abs() <= neutral_pct {
        pct / neutral_pct * 0.3
    } else {
        let extra = (pct.abs() - neutral_pct).clamp(0.0, neutral_pct * 3.0);
        sign * 0.3 + sign * (extra / (neutral_pct * 3.0)) * 0.7
    }
    .clamp(-1.0, 1.0);

    (
        serde_json::json!({ "ema": ema, "price": price, "period": period, "pct": pct }),
        signal,
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_period_equals_length() {
        let closes = vec![2.0, 4.0, 6.0];
        let ema = calculate_ema(&closes, 3);
        assert_eq!(ema.len(), 1);
        // Should be the SMA = (2+4+6)/3 = 4.0
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1,2,3,4,5,6,7,8,9,10]
        // SMA of first 5 = 3.0, multiplier = 2/6 = 1/3
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6); // indices 4..9

        let mult = 2.0 / 6.0;
        let mut expected = 3.0; // SMA seed
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&closes, 3);
        // SMA of first 3 = 2.0, then next value is NaN => EMA becomes NaN => break
        // So the result should just be the seed.
        assert_eq!(ema.len(), 1);
    }

    // ---- compute (registry entry point) -----------------------------------

    #[test]
    fn compute_insufficient_data_is_nan() {
        let (_, signal) = compute(&[1.0, 2.0], 20, 0.5);
        assert!(signal.is_nan());
    }

    #[test]
    fn compute_price_above_ema_is_bullish() {
        let mut closes = vec![100.0; 20];
        closes.push(110.0);
        let (_, signal) = compute(&closes, 20, 0.5);
        assert!(signal > 0.0, "got {signal}");
    }

    #[test]
    fn compute_price_below_ema_is_bearish() {
        let mut closes = vec![100.0; 20];
        closes.push(90.0);
        let (_, signal) = compute(&closes, 20, 0.5);
        assert!(signal < 0.0, "got {signal}");
    }

    #[test]
    fn compute_signal_clamped_to_unit_range() {
        let mut closes = vec![100.0; 20];
        closes.push(1000.0);
        let (_, signal) = compute(&closes, 20, 0.5);
        assert!((-1.0..=1.0).contains(&signal));
    }
}
