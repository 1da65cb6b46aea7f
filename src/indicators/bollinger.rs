// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). The Band Width (BBW) is the normalised
// distance: BBW = (upper - lower) / middle * 100.
//
// BBW is the primary metric used by the regime detector.

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
}

/// Calculate Bollinger Bands for the given closing prices.
///
/// Returns `Some(BollingerResult)` containing:
/// - `upper`  = SMA + `num_std` * σ
/// - `middle` = SMA
/// - `lower`  = SMA - `num_std` * σ
/// - `width`  = (upper - lower) / middle * 100  (Bollinger Band Width)
///
/// Returns `None` when:
/// - Fewer than `period` data points.
/// - Middle band is zero (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let sum: f64 = window.iter().sum();
    let middle = sum / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    if width.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
            width,
        })
    } else {
        None
    }
}

/// Compute the `bbands_20_2` raw bundle and normalized signal for the
/// registry. `percent_b` expresses where the latest price sits relative to
/// the bands: 0 at the lower band, 1 at the upper band.
pub fn compute(closes: &[f64]) -> (serde_json::Value, f64) {
    const PERIOD: usize = 20;
    const NUM_STD: f64 = 2.0;

    let (Some(bb), Some(&price)) = (calculate_bollinger(closes, PERIOD, NUM_STD), closes.last())
    else {
        return (
            serde_json::json!({ "upper": null, "middle": null, "lower": null, "percent_b": null }),
            f64::NAN,
        );
    };

    let band_range = bb.upper - bb.lower;
    if band_range == 0.0 {
        return (
            serde_json::json!({
                "upper": bb.upper, "middle": bb.middle, "lower": bb.lower,
                "percent_b": null, "bandwidth": bb.width,
            }),
            f64::NAN,
        );
    }

    let percent_b = (price - bb.lower) / band_range;

    let signal = if percent_b <= 0.0 {
        (0.5 + percent_b.abs() * 0.5).min(1.0)
    } else if percent_b >= 1.0 {
        (-0.5 - (percent_b - 1.0) * 0.5).max(-1.0)
    } else if percent_b < 0.3 {
        (0.3 - percent_b) / 0.3 * 0.5
    } else if percent_b > 0.7 {
        -(percent_b - 0.7) / 0.3 * 0.5
    } else {
        (0.5 - percent_b) * 0.3
    };

    (
        serde_json::json!({
            "upper": bb.upper,
            "middle": bb.middle,
            "lower": bb.lower,
            "percent_b": percent_b,
            "bandwidth": bb.width,
        }),
        signal,
    )
}
