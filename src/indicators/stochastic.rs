// =============================================================================
// Stochastic Oscillator (slow stochastic: %K smoothed, %D = SMA(%K))
// =============================================================================
//
// Raw %K = 100 * (close - lowest_low(period)) / (highest_high(period) -
// lowest_low(period)), taken over a rolling window. The "slow" %K used here
// is the `smooth`-period SMA of the raw %K series; %D is the `d`-period SMA
// of that smoothed %K.
// =============================================================================

use crate::candle::Candle;

const PERIOD: usize = 14;
const SMOOTH: usize = 3;
const D: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct StochResult {
    pub k: f64,
    pub d: f64,
}

fn raw_k_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if candles.len() < period {
        return Vec::new();
    }

    (period - 1..candles.len())
        .map(|i| {
            let window = &candles[i + 1 - period..=i];
            let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let range = highest - lowest;
            if range == 0.0 {
                50.0
            } else {
                (candles[i].close - lowest) / range * 100.0
            }
        })
        .collect()
}

fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }
    (period - 1..values.len())
        .map(|i| values[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
        .collect()
}

/// Compute the most recent slow %K / %D pair, or `None` if there isn't
/// enough history.
pub fn calculate_stochastic(candles: &[Candle]) -> Option<StochResult> {
    let raw_k = raw_k_series(candles, PERIOD);
    let k_series = sma_series(&raw_k, SMOOTH);
    let d_series = sma_series(&k_series, D);

    let d = *d_series.last()?;
    let k = *k_series.last()?;

    if !k.is_finite() || !d.is_finite() {
        return None;
    }

    Some(StochResult { k, d })
}

/// Compute the `stoch_14_3_3` raw bundle and normalized signal for the
/// registry. The level component mirrors RSI-style reversal scoring on %K
/// (scaled down by half in the middle zone); a crossover boost rewards %K
/// crossing above/below %D.
pub fn compute(candles: &[Candle]) -> (serde_json::Value, f64) {
    let Some(result) = calculate_stochastic(candles) else {
        return (
            serde_json::json!({ "k": null, "d": null }),
            f64::NAN,
        );
    };

    const OVERSOLD: f64 = 20.0;
    const OVERBOUGHT: f64 = 80.0;

    let level_signal = if result.k <= OVERSOLD {
        (OVERSOLD - result.k) / OVERSOLD
    } else if result.k >= OVERBOUGHT {
        -(result.k - OVERBOUGHT) / (100.0 - OVERBOUGHT)
    } else {
        let midpoint = (OVERSOLD + OVERBOUGHT) / 2.0;
        (midpoint - result.k) / (OVERBOUGHT - OVERSOLD) * 0.5
    };

    let cross_boost = ((result.k - result.d) / 20.0).clamp(-0.3, 0.3);

    let signal = (level_signal + cross_boost).clamp(-1.0, 1.0);

    (
        serde_json::json!({ "k": result.k, "d": result.d }),
        signal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, close, high, low, close, 1.0, 0, 1.0, 1)
    }

    #[test]
    fn insufficient_data_returns_none() {
        let candles = vec![candle(101.0, 99.0, 100.0); 5];
        assert!(calculate_stochastic(&candles).is_none());
    }

    #[test]
    fn k_at_top_of_range_near_100() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base + 1.0, base - 1.0, base + 1.0)
            })
            .collect();
        let result = calculate_stochastic(&candles).unwrap();
        assert!(result.k > 50.0, "got {}", result.k);
    }

    #[test]
    fn compute_insufficient_data_is_nan() {
        let candles = vec![candle(101.0, 99.0, 100.0); 5];
        let (_, signal) = compute(&candles);
        assert!(signal.is_nan());
    }

    #[test]
    fn compute_overbought_is_bearish() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base + 1.0, base - 1.0, base + 1.0)
            })
            .collect();
        let (_, signal) = compute(&candles);
        assert!(signal < 0.0, "got {signal}");
    }

    #[test]
    fn compute_signal_clamped() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 5.0;
                candle(base + 2.0, base - 2.0, base)
            })
            .collect();
        let (_, signal) = compute(&candles);
        assert!((-1.0..=1.0).contains(&signal));
    }
}
