// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================
//
// OBV accumulates volume with a sign determined by the direction of the
// close-to-close price change: added on an up bar, subtracted on a down bar,
// unchanged on a flat bar. The signal comes from the slope of a linear fit
// over the trailing `slope_period` OBV values, normalized against the
// window's own mean magnitude so it's comparable across symbols of very
// different volume scale.
// =============================================================================

use crate::candle::Candle;

const SLOPE_PERIOD: usize = 10;

/// Compute the full OBV series for a candle slice.
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    if candles.is_empty() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    series.push(obv);

    for w in candles.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        obv += if cur.close > prev.close {
            cur.volume
        } else if cur.close < prev.close {
            -cur.volume
        } else {
            0.0
        };
        series.push(obv);
    }

    series
}

/// Least-squares slope of `y` against `x = 0..n-1`.
fn linear_slope(y: &[f64]) -> Option<f64> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = (0..n).map(|i| i as f64 * y[i]).sum();
    let sum_xx: f64 = (0..n).map(|i| (i as f64).powi(2)).sum();

    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }

    Some((n_f * sum_xy - sum_x * sum_y) / denom)
}

/// Compute the `obv` raw bundle and normalized signal for the registry.
pub fn compute(candles: &[Candle]) -> (serde_json::Value, f64) {
    let series = calculate_obv(candles);

    if series.len() < SLOPE_PERIOD + 1 {
        return (
            serde_json::json!({ "obv": null, "slope": null }),
            f64::NAN,
        );
    }

    let window = &series[series.len() - SLOPE_PERIOD..];
    let Some(slope) = linear_slope(window) else {
        return (
            serde_json::json!({ "obv": series.last(), "slope": null }),
            f64::NAN,
        );
    };

    let mean_magnitude = window.iter().map(|v| v.abs()).sum::<f64>() / window.len() as f64;
    if mean_magnitude == 0.0 {
        return (
            serde_json::json!({ "obv": series.last(), "slope": slope }),
            f64::NAN,
        );
    }

    let slope_normalized = slope / mean_magnitude * 100.0;
    let signal = (slope_normalized / 5.0).clamp(-1.0, 1.0);

    (
        serde_json::json!({
            "obv": series.last(),
            "slope": slope,
            "slope_normalized": slope_normalized,
        }),
        signal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle::new(0, close, close, close, close, volume, 0, volume * close, 1)
    }

    #[test]
    fn obv_accumulates_on_up_bars() {
        let candles = vec![candle(100.0, 10.0), candle(101.0, 5.0), candle(102.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn obv_subtracts_on_down_bars() {
        let candles = vec![candle(100.0, 10.0), candle(99.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![0.0, -5.0]);
    }

    #[test]
    fn obv_flat_bar_unchanged() {
        let candles = vec![candle(100.0, 10.0), candle(100.0, 5.0)];
        let series = calculate_obv(&candles);
        assert_eq!(series, vec![0.0, 0.0]);
    }

    #[test]
    fn compute_insufficient_data_is_nan() {
        let candles = vec![candle(100.0, 1.0); 5];
        let (_, signal) = compute(&candles);
        assert!(signal.is_nan());
    }

    #[test]
    fn compute_sustained_buying_is_bullish() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(100.0 + i as f64, 10.0)).collect();
        let (_, signal) = compute(&candles);
        assert!(signal > 0.0, "got {signal}");
    }

    #[test]
    fn compute_sustained_selling_is_bearish() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(200.0 - i as f64, 10.0)).collect();
        let (_, signal) = compute(&candles);
        assert!(signal < 0.0, "got {signal}");
    }
}
