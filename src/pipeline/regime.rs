// =============================================================================
// Regime Classifier (C7)
// =============================================================================
//
// Aggregates the top-20 snapshots by rank from the latest run of a timeframe
// into a single market regime label, continuously overwriting the one row
// per timeframe.
// =============================================================================

use chrono::Utc;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::ranker::RankedSnapshot;
use crate::store::{Store, TimeframeRegime};
use crate::types::{Regime, Timeframe};

const TOP_N: usize = 20;

fn raw_f64(snapshot: &RankedSnapshot, indicator: &str, field: &str) -> Option<f64> {
    snapshot.indicators.get(indicator)?.raw.get(field)?.as_f64()
}

/// Classify the given snapshots (already the top-N by rank) into a regime
/// label and confidence, per the ordered thresholds below.
pub fn classify(snapshots: &[RankedSnapshot], config: &EngineConfig) -> (Regime, u8, f64, f64, f64) {
    let top: Vec<&RankedSnapshot> = snapshots.iter().take(TOP_N).collect();
    let n = top.len().max(1) as f64;

    let avg_score = top.iter().map(|s| s.bullish_score).sum::<f64>() / n;
    let adx_values: Vec<f64> = top.iter().filter_map(|s| raw_f64(s, "adx_14", "adx")).collect();
    let bandwidth_values: Vec<f64> = top
        .iter()
        .filter_map(|s| raw_f64(s, "bbands_20_2", "bandwidth"))
        .collect();

    let avg_adx = if adx_values.is_empty() {
        0.0
    } else {
        adx_values.iter().sum::<f64>() / adx_values.len() as f64
    };
    let avg_bandwidth = if bandwidth_values.is_empty() {
        0.0
    } else {
        bandwidth_values.iter().sum::<f64>() / bandwidth_values.len() as f64
    };

    let (regime, confidence) = if avg_bandwidth > config.regime_bandwidth_threshold
        && avg_adx > config.regime_adx_threshold
    {
        (Regime::Volatile, (50.0 + avg_adx + avg_bandwidth).min(100.0))
    } else if avg_score > config.regime_score_bull_threshold && avg_adx > config.regime_adx_threshold {
        (Regime::TrendingBull, ((avg_score - 0.5) * 200.0 + avg_adx).min(100.0))
    } else if avg_score < config.regime_score_bear_threshold && avg_adx > config.regime_adx_threshold {
        (Regime::TrendingBear, ((0.5 - avg_score) * 200.0 + avg_adx).min(100.0))
    } else {
        (Regime::Ranging, (100.0 - avg_adx * 2.0).max(30.0))
    };

    (regime, confidence.round() as u8, avg_score, avg_adx, avg_bandwidth)
}

/// Classify the latest run for `timeframe` and upsert the single per-
/// timeframe regime row.
#[instrument(skip(store, config))]
pub fn compute_regime(store: &Store, config: &EngineConfig, timeframe: Timeframe) {
    let snapshots = store.latest_snapshots(timeframe);
    if snapshots.is_empty() {
        return;
    }

    let (regime, confidence, avg_score, avg_adx, avg_bandwidth) = classify(&snapshots, config);

    store.set_timeframe_regime(TimeframeRegime {
        timeframe,
        regime,
        confidence,
        avg_score,
        avg_adx,
        avg_bandwidth,
        symbols_analyzed: snapshots.len(),
        computed_at: Utc::now().timestamp_millis(),
    });
}
