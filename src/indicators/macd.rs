// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow), signal line = EMA(MACD line, signal),
// histogram = MACD line - signal line. The two EMA series start at different
// offsets (slow needs more history to seed), so they are aligned on their
// common suffix before subtracting.
// =============================================================================

use super::ema::calculate_ema;

const FAST: usize = 12;
const SLOW: usize = 26;
const SIGNAL: usize = 9;

/// Full MACD result: the latest MACD line value, signal line value, and
/// histogram (their difference).
#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD/signal/histogram triple, or `None` if there
/// isn't enough history to seed both EMAs and the signal line.
pub fn calculate_macd(closes: &[f64]) -> Option<MacdResult> {
    if closes.len() < SLOW + SIGNAL {
        return None;
    }

    let fast_ema = calculate_ema(closes, FAST);
    let slow_ema = calculate_ema(closes, SLOW);

    if slow_ema.is_empty() {
        return None;
    }

    // `fast_ema` starts `SLOW - FAST` bars earlier than `slow_ema`; drop that
    // leading slice so the two series line up index-for-index.
    let offset = SLOW - FAST;
    if fast_ema.len() <= offset {
        return None;
    }
    let fast_aligned = &fast_ema[offset..];

    let len = fast_aligned.len().min(slow_ema.len());
    let macd_line: Vec<f64> = (0..len)
        .map(|i| fast_aligned[i] - slow_ema[i])
        .collect();

    if macd_line.len() < SIGNAL {
        return None;
    }

    let signal_series = calculate_ema(&macd_line, SIGNAL);
    let signal_line = *signal_series.last()?;
    let macd = *macd_line.last()?;
    let histogram = macd - signal_line;

    if !macd.is_finite() || !signal_line.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd,
        signal_line,
        histogram,
    })
}

/// Compute the `macd_12_26_9` raw bundle and normalized signal for the
/// registry.
pub fn compute(closes: &[f64]) -> (serde_json::Value, f64) {
    let Some(result) = calculate_macd(closes) else {
        return (
            serde_json::json!({ "macd": null, "signal": null, "histogram": null }),
            f64::NAN,
        );
    };

    let signal = if result.macd.abs() > 0.0 {
        (result.histogram / result.macd.abs()).clamp(-1.0, 1.0)
    } else if result.histogram != 0.0 {
        result.histogram.signum() * 0.5
    } else {
        0.0
    };

    (
        serde_json::json!({
            "macd": result.macd,
            "signal": result.signal_line,
            "histogram": result.histogram,
        }),
        signal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_none() {
        let closes: Vec<f64> = (0..20).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes).is_none());
    }

    #[test]
    fn uptrend_produces_positive_histogram() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + x as f64 * 0.5).collect();
        let result = calculate_macd(&closes).unwrap();
        assert!(result.histogram >= 0.0, "got {}", result.histogram);
    }

    #[test]
    fn compute_insufficient_data_is_nan() {
        let (_, signal) = compute(&[1.0, 2.0, 3.0]);
        assert!(signal.is_nan());
    }

    #[test]
    fn compute_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + x as f64 * 0.5).collect();
        let (_, signal) = compute(&closes);
        assert!(signal > 0.0, "got {signal}");
    }

    #[test]
    fn compute_downtrend_is_bearish() {
        let closes: Vec<f64> = (0..80).map(|x| 200.0 - x as f64 * 0.5).collect();
        let (_, signal) = compute(&closes);
        assert!(signal < 0.0, "got {signal}");
    }

    #[test]
    fn compute_signal_always_within_unit_range() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + (x as f64 * 0.3).sin() * 5.0).collect();
        let (_, signal) = compute(&closes);
        assert!((-1.0..=1.0).contains(&signal));
    }
}
