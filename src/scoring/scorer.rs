// =============================================================================
// Bullish score — weighted average of indicator signals, rescaled to [0, 1]
// =============================================================================

use crate::indicators::IndicatorOutput;

/// Weighted average of valid (non-NaN) signals, rescaled from [-1, +1] to
/// [0, 1]. Falls back to 0.5 (neutral) when there are no valid signals or
/// the total weight of the valid ones is zero.
pub fn bullish_score<'a>(outputs: impl IntoIterator<Item = &'a IndicatorOutput>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for output in outputs {
        if output.signal.is_nan() {
            continue;
        }
        weighted_sum += output.signal * output.weight;
        total_weight += output.weight;
    }

    if total_weight == 0.0 {
        return 0.5;
    }

    let avg = weighted_sum / total_weight;
    ((avg + 1.0) / 2.0).clamp(0.0, 1.0)
}
