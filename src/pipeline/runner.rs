// =============================================================================
// Pipeline Runner (C6)
// =============================================================================
//
// One run per (timeframe, tick): lock, create run, fetch symbols, fetch
// OHLCV, score/rank, persist, complete, trigger regime. The per-timeframe
// lock is acquired non-blocking — a conflicting tick is dropped as
// `skipped`, never queued — and released by the `TimeframeLock` guard's
// `Drop`, which fires even on an early return from `?`.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::exchange::ExchangeClient;
use crate::pipeline::regime;
use crate::ranker::{self, RankedSnapshot, ScoredSymbol};
use crate::store::{ComputationRun, Store, StoredSymbol};
use crate::types::{RunStatus, Timeframe};

/// Per-symbol latest close and (high, low, close), handed to the
/// orchestrator so it can evaluate SL/TP without refetching candles.
#[derive(Debug, Clone, Copy)]
pub struct SymbolBar {
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// Outcome of one pipeline tick, returned to the scheduler and consumed by
/// the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineRunSummary {
    pub run_id: String,
    pub timeframe: Timeframe,
    pub status: RunStatus,
    pub symbol_count: usize,
    pub bars: HashMap<String, SymbolBar>,
}

fn split_symbol(symbol: &str) -> (String, String) {
    const QUOTE: &str = "USDT";
    if let Some(base) = symbol.strip_suffix(QUOTE) {
        (base.to_string(), QUOTE.to_string())
    } else {
        (symbol.to_string(), String::new())
    }
}

#[instrument(skip(store, exchange, config))]
pub async fn run_pipeline(
    store: &Store,
    exchange: &ExchangeClient,
    config: &EngineConfig,
    timeframe: Timeframe,
) -> PipelineRunSummary {
    let Some(_lock) = store.try_lock_timeframe(timeframe) else {
        info!(%timeframe, "pipeline tick skipped — run already in flight");
        return PipelineRunSummary {
            run_id: String::new(),
            timeframe,
            status: RunStatus::Skipped,
            symbol_count: 0,
            bars: HashMap::new(),
        };
    };

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().timestamp_millis();

    store.insert_computation_run(ComputationRun {
        id: run_id.clone(),
        timeframe,
        started_at,
        finished_at: None,
        symbol_count: 0,
        status: RunStatus::Running,
        error: None,
    });

    match execute(store, exchange, config, timeframe, &run_id, started_at).await {
        Ok(summary) => {
            store.update_computation_run(&run_id, |run| {
                run.status = RunStatus::Completed;
                run.finished_at = Some(Utc::now().timestamp_millis());
                run.symbol_count = summary.symbol_count;
            });
            drop(_lock);
            regime::compute_regime(store, config, timeframe);
            summary
        }
        Err(e) => {
            warn!(%timeframe, run_id, error = %e, "pipeline run failed");
            store.update_computation_run(&run_id, |run| {
                run.status = RunStatus::Failed;
                run.finished_at = Some(Utc::now().timestamp_millis());
                run.error = Some(e.to_string());
            });
            PipelineRunSummary {
                run_id,
                timeframe,
                status: RunStatus::Failed,
                symbol_count: 0,
                bars: HashMap::new(),
            }
        }
    }
}

async fn execute(
    store: &Store,
    exchange: &ExchangeClient,
    config: &EngineConfig,
    timeframe: Timeframe,
    run_id: &str,
    computed_at: i64,
) -> Result<PipelineRunSummary, EngineError> {
    let symbols = exchange
        .list_active_symbols(config.min_quote_volume_usd)
        .await
        .map_err(|e| EngineError::Pipeline { reason: e.to_string() })?;

    for symbol in &symbols {
        let (base_asset, quote_asset) = split_symbol(&symbol.symbol);
        store.upsert_symbol(StoredSymbol {
            symbol: symbol.symbol.clone(),
            base_asset,
            quote_asset,
            active: true,
            last_seen_at: computed_at,
        });
    }

    let symbol_names: Vec<String> = symbols.iter().map(|s| s.symbol.clone()).collect();
    let candle_window = timeframe.candle_window();
    let candles = exchange
        .fetch_candle_batch(&symbol_names, timeframe.interval_str(), candle_window as u32)
        .await;

    let mut scored = Vec::new();
    let mut bars = HashMap::new();

    for symbol in &symbols {
        let Some(candle_series) = candles.get(&symbol.symbol) else {
            continue;
        };
        if candle_series.len() < config.min_candles_per_symbol {
            warn!(symbol = %symbol.symbol, count = candle_series.len(), "dropping symbol — insufficient candles");
            continue;
        }

        if let Some(last) = candle_series.last() {
            bars.insert(
                symbol.symbol.clone(),
                SymbolBar { close: last.close, high: last.high, low: last.low },
            );
        }

        scored.push(ScoredSymbol {
            symbol: symbol.symbol.clone(),
            candles: candle_series.clone(),
            quote_volume_24h: symbol.quote_volume_24h,
            funding_rate: None,
        });
    }

    let snapshots: Vec<RankedSnapshot> = ranker::rank(&scored, timeframe.interval_str(), run_id, computed_at);
    let symbol_count = snapshots.len();
    store.insert_snapshots(snapshots);

    Ok(PipelineRunSummary {
        run_id: run_id.to_string(),
        timeframe,
        status: RunStatus::Completed,
        symbol_count,
        bars,
    })
}
