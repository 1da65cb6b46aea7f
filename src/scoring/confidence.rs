// =============================================================================
// Confidence score — agreement, completeness, and volume adequacy
// =============================================================================

use crate::indicators::IndicatorOutput;

const EXPECTED_INDICATOR_COUNT: f64 = 9.0;
const HIGH_PERCENTILE: f64 = 0.8;

const WEIGHT_AGREEMENT: f64 = 0.60;
const WEIGHT_COMPLETENESS: f64 = 0.25;
const WEIGHT_VOLUME: f64 = 0.15;

/// The three components that make up a confidence score, kept separate so
/// callers (and tests) can inspect why a score came out the way it did.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceBreakdown {
    pub agreement: f64,
    pub completeness: f64,
    pub volume_adequacy: f64,
    pub confidence: f64,
}

/// How volume context is supplied to the confidence calculation. Either the
/// caller already knows the symbol's percentile rank, or it hands over the
/// symbol's own volume plus the full cross-section to rank against, or
/// there's no volume context available at all.
pub enum VolumeContext<'a> {
    Percentile(f64),
    AgainstCohort { volume: f64, cohort: &'a [f64] },
    None,
}

/// Population standard deviation (divide by n, not n-1) — matches the
/// agreement component's intent of measuring how tightly the signals in
/// *this* snapshot cluster, not an estimate over a larger population.
fn population_stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn agreement(valid_signals: &[f64]) -> f64 {
    if valid_signals.len() < 2 {
        return 1.0;
    }
    1.0 - population_stddev(valid_signals).min(1.0)
}

fn completeness(valid_count: usize) -> f64 {
    valid_count as f64 / EXPECTED_INDICATOR_COUNT
}

/// Compute volume adequacy from whatever context is available.
pub fn volume_adequacy(context: VolumeContext) -> f64 {
    let percentile = match context {
        VolumeContext::None => return 0.5,
        VolumeContext::Percentile(p) => p,
        VolumeContext::AgainstCohort { volume, cohort } => {
            if cohort.is_empty() {
                return 0.5;
            }
            let below = cohort.iter().filter(|&&v| v < volume).count();
            below as f64 / cohort.len() as f64
        }
    };

    if percentile >= HIGH_PERCENTILE {
        1.0
    } else {
        percentile / HIGH_PERCENTILE
    }
}

/// Compute the full confidence breakdown for an indicator output set.
pub fn confidence_score<'a>(
    outputs: impl IntoIterator<Item = &'a IndicatorOutput>,
    volume_context: VolumeContext,
) -> ConfidenceBreakdown {
    let valid_signals: Vec<f64> = outputs
        .into_iter()
        .map(|o| o.signal)
        .filter(|s| !s.is_nan())
        .collect();

    let agreement = agreement(&valid_signals);
    let completeness = completeness(valid_signals.len());
    let volume_adequacy = volume_adequacy(volume_context);

    let confidence = (WEIGHT_AGREEMENT * agreement
        + WEIGHT_COMPLETENESS * completeness
        + WEIGHT_VOLUME * volume_adequacy)
        .clamp(0.0, 1.0);

    ConfidenceBreakdown {
        agreement,
        completeness,
        volume_adequacy,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Category, SignalLabel, SignalStrength};

    fn output(signal: f64) -> IndicatorOutput {
        IndicatorOutput {
            name: "test",
            category: Category::Momentum,
            weight: 0.1,
            raw: serde_json::json!({}),
            signal,
            label: SignalLabel::Neutral,
            strength: SignalStrength::Weak,
        }
    }

    #[test]
    fn fewer_than_two_valid_signals_has_full_agreement() {
        assert_eq!(agreement(&[0.5]), 1.0);
        assert_eq!(agreement(&[]), 1.0);
    }

    #[test]
    fn identical_signals_have_full_agreement() {
        assert!((agreement(&[0.3, 0.3, 0.3]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn completeness_scales_with_valid_count() {
        assert!((completeness(9) - 1.0).abs() < 1e-9);
        assert!((completeness(0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn volume_adequacy_no_context_is_neutral() {
        assert_eq!(volume_adequacy(VolumeContext::None), 0.5);
    }

    #[test]
    fn volume_adequacy_above_high_percentile_is_one() {
        assert_eq!(volume_adequacy(VolumeContext::Percentile(0.95)), 1.0);
    }

    #[test]
    fn volume_adequacy_below_high_percentile_scales_linearly() {
        let got = volume_adequacy(VolumeContext::Percentile(0.4));
        assert!((got - 0.5).abs() < 1e-9);
    }

    #[test]
    fn volume_adequacy_against_cohort_ranks_correctly() {
        let cohort = [10.0, 20.0, 30.0, 40.0, 50.0];
        // 30.0 is strictly above 2 of 5 => percentile 0.4 => 0.4/0.8 = 0.5
        let got = volume_adequacy(VolumeContext::AgainstCohort {
            volume: 30.0,
            cohort: &cohort,
        });
        assert!((got - 0.5).abs() < 1e-9);
    }

    #[test]
    fn full_breakdown_clips_to_unit_range() {
        let outs = vec![output(0.9), output(-0.9), output(0.9)];
        let breakdown = confidence_score(&outs, VolumeContext::None);
        assert!((0.0..=1.0).contains(&breakdown.confidence));
    }
}
