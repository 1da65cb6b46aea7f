// =============================================================================
// Ranker (C5)
// =============================================================================
//
// Turns a batch of scored symbols into an ordered list of ranked snapshots:
// sort by (bullish desc, confidence desc), assign contiguous ranks, and
// embed a reserved `_market` pseudo-indicator carrying plain price/volume
// deltas alongside the nine computed indicators.
//
// `rank_single` exposes the same per-symbol machinery without the
// cross-symbol sort, for the backtest engine which only ever evaluates one
// candidate per bar.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::highlights::{generate_highlights, Chip};
use crate::indicators::{self, IndicatorOutput};
use crate::scoring::{bullish_score, confidence_score, ConfidenceBreakdown, VolumeContext};

/// One symbol's inputs to a ranking pass.
#[derive(Debug, Clone)]
pub struct ScoredSymbol {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub quote_volume_24h: f64,
    pub funding_rate: Option<f64>,
}

/// Plain price/volume deltas exposed as the `_market` pseudo-indicator —
/// not a computed signal, just context the dashboard/agents can read
/// alongside the nine real indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub price_change_pct: Option<f64>,
    pub volume_change_pct: Option<f64>,
    pub price_change_abs: Option<f64>,
    pub volume_change_abs: Option<f64>,
    pub funding_rate: Option<f64>,
}

/// NaN and +/-infinity become `None` (serialized as JSON `null`) rather
/// than propagating a value no downstream consumer can act on.
fn sanitize(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

fn market_context(candles: &[Candle], funding_rate: Option<f64>) -> MarketContext {
    if candles.len() < 2 {
        return MarketContext {
            price_change_pct: None,
            volume_change_pct: None,
            price_change_abs: None,
            volume_change_abs: None,
            funding_rate,
        };
    }

    let prev = &candles[candles.len() - 2];
    let cur = &candles[candles.len() - 1];

    let price_change_abs = cur.close - prev.close;
    let price_change_pct = if prev.close != 0.0 {
        price_change_abs / prev.close * 100.0
    } else {
        f64::NAN
    };

    let volume_change_abs = cur.volume - prev.volume;
    let volume_change_pct = if prev.volume != 0.0 {
        volume_change_abs / prev.volume * 100.0
    } else {
        f64::NAN
    };

    MarketContext {
        price_change_pct: sanitize(price_change_pct),
        volume_change_pct: sanitize(volume_change_pct),
        price_change_abs: sanitize(price_change_abs),
        volume_change_abs: sanitize(volume_change_abs),
        funding_rate,
    }
}

/// A single symbol's full scored-and-ranked output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSnapshot {
    pub rank: u32,
    pub symbol: String,
    pub timeframe: String,
    pub run_id: String,
    pub computed_at: i64,
    pub bullish_score: f64,
    pub confidence_score: f64,
    pub confidence_breakdown: ConfidenceBreakdownDto,
    pub indicators: HashMap<&'static str, IndicatorOutput>,
    pub market: MarketContext,
    pub highlights: Vec<Chip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceBreakdownDto {
    pub agreement: f64,
    pub completeness: f64,
    pub volume_adequacy: f64,
}

impl From<ConfidenceBreakdown> for ConfidenceBreakdownDto {
    fn from(b: ConfidenceBreakdown) -> Self {
        Self {
            agreement: b.agreement,
            completeness: b.completeness,
            volume_adequacy: b.volume_adequacy,
        }
    }
}

/// Score and rank a full batch of symbols for one timeframe/run.
///
/// Volume-percentile context is computed once across the whole batch: for
/// each symbol, the fraction of other symbols in the same run with strictly
/// lower 24h quote volume.
pub fn rank(
    scored_symbols: &[ScoredSymbol],
    timeframe: &str,
    run_id: &str,
    computed_at: i64,
) -> Vec<RankedSnapshot> {
    let cohort: Vec<f64> = scored_symbols.iter().map(|s| s.quote_volume_24h).collect();

    let mut snapshots: Vec<RankedSnapshot> = scored_symbols
        .iter()
        .map(|scored| {
            score_one(
                scored,
                VolumeContext::AgainstCohort {
                    volume: scored.quote_volume_24h,
                    cohort: &cohort,
                },
                timeframe,
                run_id,
                computed_at,
                0,
            )
        })
        .collect();

    snapshots.sort_by(|a, b| {
        b.bullish_score
            .partial_cmp(&a.bullish_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.confidence_score
                    .partial_cmp(&a.confidence_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    for (i, snapshot) in snapshots.iter_mut().enumerate() {
        snapshot.rank = (i + 1) as u32;
    }

    snapshots
}

/// Score a single symbol without a cross-symbol sort. Used by the backtest
/// engine, which evaluates exactly one candidate per bar and has no cohort
/// to rank a volume percentile against.
pub fn rank_single(
    scored: &ScoredSymbol,
    timeframe: &str,
    run_id: &str,
    computed_at: i64,
) -> RankedSnapshot {
    score_one(scored, VolumeContext::None, timeframe, run_id, computed_at, 1)
}

fn score_one(
    scored: &ScoredSymbol,
    volume_context: VolumeContext,
    timeframe: &str,
    run_id: &str,
    computed_at: i64,
    rank: u32,
) -> RankedSnapshot {
    let outputs = indicators::compute_all(&scored.candles);
    let bullish = bullish_score(outputs.values());
    let breakdown = confidence_score(outputs.values(), volume_context);
    let highlights = generate_highlights(&outputs);
    let market = market_context(&scored.candles, scored.funding_rate);

    RankedSnapshot {
        rank,
        symbol: scored.symbol.clone(),
        timeframe: timeframe.to_string(),
        run_id: run_id.to_string(),
        computed_at,
        bullish_score: bullish,
        confidence_score: breakdown.confidence,
        confidence_breakdown: breakdown.into(),
        indicators: outputs,
        market,
        highlights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64) -> Candle {
        Candle::new(0, close, close, close, close, 1_000.0, 0, close * 1_000.0, 1)
    }

    fn symbol(name: &str, trend: f64, volume: f64) -> ScoredSymbol {
        let candles: Vec<Candle> = (0..60).map(|i| candle(100.0 + i as f64 * trend)).collect();
        ScoredSymbol {
            symbol: name.to_string(),
            candles,
            quote_volume_24h: volume,
            funding_rate: None,
        }
    }

    #[test]
    fn rank_assigns_contiguous_ranks() {
        let symbols = vec![symbol("AAA", 1.0, 1_000.0), symbol("BBB", -1.0, 500.0)];
        let snapshots = rank(&symbols, "1h", "run-1", 0);
        assert_eq!(snapshots.len(), 2);
        let ranks: Vec<u32> = snapshots.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn rank_orders_bullish_first() {
        let symbols = vec![symbol("BEAR", -1.0, 1_000.0), symbol("BULL", 1.0, 1_000.0)];
        let snapshots = rank(&symbols, "1h", "run-1", 0);
        assert_eq!(snapshots[0].symbol, "BULL");
        assert_eq!(snapshots[1].symbol, "BEAR");
    }

    #[test]
    fn market_pseudo_indicator_reflects_last_bar_change() {
        let sym = symbol("AAA", 1.0, 1_000.0);
        let snapshots = rank(&[sym], "1h", "run-1", 0);
        let market = &snapshots[0].market;
        assert!(market.price_change_abs.unwrap() > 0.0);
    }

    #[test]
    fn rank_single_has_no_cohort_and_neutral_volume_adequacy() {
        let sym = symbol("AAA", 1.0, 1_000.0);
        let snapshot = rank_single(&sym, "1h", "backtest-1", 0);
        assert!((snapshot.confidence_breakdown.volume_adequacy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_prev_close_sanitizes_to_null_not_nan() {
        let mut candles: Vec<Candle> = (0..30).map(|i| candle(100.0 + i as f64)).collect();
        candles.push(Candle::new(0, 0.0, 0.0, 0.0, 0.0, 1.0, 0, 0.0, 1));
        candles.push(candle(50.0));
        let sym = ScoredSymbol {
            symbol: "ZERO".to_string(),
            candles,
            quote_volume_24h: 1.0,
            funding_rate: None,
        };
        let snapshot = rank_single(&sym, "1h", "run-1", 0);
        assert!(snapshot.market.price_change_pct.is_none());
    }
}
