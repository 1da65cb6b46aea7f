// =============================================================================
// In-process persistent store
// =============================================================================
//
// Stands in for the database described in §3/§5: one composition root,
// `parking_lot::RwLock`-guarded tables, `Arc`-shared across tasks, exactly
// the shape `AppState` uses. A real deployment would swap this for a
// database-backed store without changing any component's public contract —
// every method here is the seam such a port would cut along.
//
// The per-timeframe advisory lock is a plain `AtomicBool` rather than a
// `Mutex` guarding real data: the data it protects (snapshots, computation
// runs) lives in its own `RwLock`, so the lock only needs to answer "is a
// run for this timeframe already in flight."
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ranker::RankedSnapshot;
use crate::types::{AgentSource, AgentStatus, BacktestStatus, Direction, Engine, ExitReason, Regime, RunStatus, Timeframe};

/// A tradable instrument. Created on first observation, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSymbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub active: bool,
    pub last_seen_at: i64,
}

/// One execution of the pipeline for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationRun {
    pub id: String,
    pub timeframe: Timeframe,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub symbol_count: usize,
    pub status: RunStatus,
    pub error: Option<String>,
}

/// One row per timeframe, continuously overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeRegime {
    pub timeframe: Timeframe,
    pub regime: Regime,
    pub confidence: u8,
    pub avg_score: f64,
    pub avg_adx: f64,
    pub avg_bandwidth: f64,
    pub symbols_analyzed: usize,
    pub computed_at: i64,
}

/// An autonomous strategy instance. Identity is immutable; only `status`
/// mutates over its life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub archetype: String,
    pub primary_timeframe: Timeframe,
    pub engine: Engine,
    pub source: AgentSource,
    pub status: AgentStatus,
    pub initial_balance: f64,
    pub evolution_threshold: f64,
}

/// 1:1 with `Agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPortfolio {
    pub agent_id: String,
    pub cash_balance: f64,
    pub total_equity: f64,
    pub total_realized_pnl: f64,
    pub total_fees_paid: f64,
    pub peak_equity: f64,
    pub trough_equity: f64,
    pub updated_at: i64,
}

/// An open position. Removed from the table on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPosition {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: i64,
    pub unrealized_pnl: f64,
}

/// Immutable record of a closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrade {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub fees_paid: f64,
    pub exit_reason: ExitReason,
    pub opened_at: i64,
    pub closed_at: i64,
    pub duration_minutes: i64,
    pub decision_ids: Vec<String>,
}

/// Immutable per-cycle decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub id: String,
    pub agent_id: String,
    pub action: String,
    pub symbol: Option<String>,
    pub reasoning: String,
    pub reasoning_summary: String,
    pub params: serde_json::Value,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
    pub prompt_version: i32,
    pub decided_at: i64,
}

/// One agent/model/task-type/day's accumulated token spend. Upserted once
/// per agent cycle rather than inserted per-decision, so the table stays
/// one row per (agent, model, task, day) instead of growing unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTokenUsage {
    pub agent_id: String,
    pub model: String,
    pub task_type: String,
    pub date: chrono::NaiveDate,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

/// One replay of a strategy against one symbol/timeframe over a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub id: String,
    pub strategy_archetype: String,
    pub timeframe: Timeframe,
    pub symbol: String,
    pub start_date: i64,
    pub end_date: i64,
    pub initial_balance: f64,
    pub status: BacktestStatus,
    pub final_equity: Option<f64>,
    pub total_pnl: Option<f64>,
    pub total_trades: Option<u32>,
    pub winning_trades: Option<u32>,
    pub max_drawdown_pct: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub equity_curve: Vec<(i64, f64)>,
    pub error: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

/// Immutable record of one trade a backtest run's mirror portfolio closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub run_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub position_size: f64,
    pub pnl: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub entry_at: i64,
    pub exit_at: i64,
    pub duration_minutes: i64,
}

/// RAII guard for a per-timeframe advisory lock: releases the flag on drop.
pub struct TimeframeLock {
    flag: Arc<AtomicBool>,
}

impl Drop for TimeframeLock {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The in-process persistent store: one `RwLock`-guarded table per entity,
/// plus the per-timeframe advisory lock map.
pub struct Store {
    symbols: RwLock<HashMap<String, StoredSymbol>>,
    snapshots: RwLock<Vec<RankedSnapshot>>,
    computation_runs: RwLock<HashMap<String, ComputationRun>>,
    timeframe_regimes: RwLock<HashMap<Timeframe, TimeframeRegime>>,
    agents: RwLock<HashMap<String, Agent>>,
    portfolios: RwLock<HashMap<String, AgentPortfolio>>,
    positions: RwLock<HashMap<String, AgentPosition>>,
    trades: RwLock<Vec<AgentTrade>>,
    decisions: RwLock<Vec<AgentDecision>>,
    token_usage: RwLock<HashMap<(String, String, String, chrono::NaiveDate), AgentTokenUsage>>,
    backtest_runs: RwLock<HashMap<String, BacktestRun>>,
    backtest_trades: RwLock<Vec<BacktestTrade>>,
    timeframe_locks: HashMap<Timeframe, Arc<AtomicBool>>,
}

impl Store {
    pub fn new() -> Self {
        let timeframe_locks = Timeframe::ALL
            .into_iter()
            .map(|tf| (tf, Arc::new(AtomicBool::new(false))))
            .collect();

        Self {
            symbols: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(Vec::new()),
            computation_runs: RwLock::new(HashMap::new()),
            timeframe_regimes: RwLock::new(HashMap::new()),
            agents: RwLock::new(HashMap::new()),
            portfolios: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            trades: RwLock::new(Vec::new()),
            decisions: RwLock::new(Vec::new()),
            token_usage: RwLock::new(HashMap::new()),
            backtest_runs: RwLock::new(HashMap::new()),
            backtest_trades: RwLock::new(Vec::new()),
            timeframe_locks,
        }
    }

    // ── Per-timeframe advisory lock ─────────────────────────────────────

    /// Attempt to acquire the advisory lock for `timeframe`. Returns `None`
    /// if a run for that timeframe is already in flight — the caller should
    /// record the tick as `skipped`, never queue it.
    pub fn try_lock_timeframe(&self, timeframe: Timeframe) -> Option<TimeframeLock> {
        let flag = self.timeframe_locks.get(&timeframe)?.clone();
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TimeframeLock { flag })
    }

    // ── Symbols ──────────────────────────────────────────────────────────

    pub fn upsert_symbol(&self, symbol: StoredSymbol) {
        self.symbols.write().insert(symbol.symbol.clone(), symbol);
    }

    pub fn active_symbols(&self) -> Vec<StoredSymbol> {
        self.symbols.read().values().filter(|s| s.active).cloned().collect()
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    pub fn insert_snapshots(&self, snapshots: Vec<RankedSnapshot>) {
        self.snapshots.write().extend(snapshots);
    }

    pub fn latest_snapshots(&self, timeframe: Timeframe) -> Vec<RankedSnapshot> {
        let snapshots = self.snapshots.read();
        let Some(latest_run) = snapshots
            .iter()
            .filter(|s| s.timeframe == timeframe.to_string())
            .map(|s| s.run_id.clone())
            .last()
        else {
            return Vec::new();
        };

        let mut result: Vec<RankedSnapshot> = snapshots
            .iter()
            .filter(|s| s.run_id == latest_run)
            .cloned()
            .collect();
        result.sort_by_key(|s| s.rank);
        result
    }

    // ── Computation runs ─────────────────────────────────────────────────

    pub fn insert_computation_run(&self, run: ComputationRun) {
        self.computation_runs.write().insert(run.id.clone(), run);
    }

    pub fn update_computation_run<F: FnOnce(&mut ComputationRun)>(&self, id: &str, f: F) {
        if let Some(run) = self.computation_runs.write().get_mut(id) {
            f(run);
        }
    }

    pub fn get_computation_run(&self, id: &str) -> Option<ComputationRun> {
        self.computation_runs.read().get(id).cloned()
    }

    // ── Regime ───────────────────────────────────────────────────────────

    pub fn set_timeframe_regime(&self, regime: TimeframeRegime) {
        self.timeframe_regimes.write().insert(regime.timeframe, regime);
    }

    pub fn get_timeframe_regime(&self, timeframe: Timeframe) -> Option<TimeframeRegime> {
        self.timeframe_regimes.read().get(&timeframe).cloned()
    }

    // ── Agents / portfolios ──────────────────────────────────────────────

    pub fn upsert_agent(&self, agent: Agent) {
        self.agents.write().insert(agent.id.clone(), agent);
    }

    pub fn get_agent(&self, id: &str) -> Option<Agent> {
        self.agents.read().get(id).cloned()
    }

    pub fn active_agents(&self) -> Vec<Agent> {
        self.agents
            .read()
            .values()
            .filter(|a| a.status == AgentStatus::Active)
            .cloned()
            .collect()
    }

    pub fn upsert_portfolio(&self, portfolio: AgentPortfolio) {
        self.portfolios.write().insert(portfolio.agent_id.clone(), portfolio);
    }

    pub fn get_portfolio(&self, agent_id: &str) -> Option<AgentPortfolio> {
        self.portfolios.read().get(agent_id).cloned()
    }

    // ── Positions ────────────────────────────────────────────────────────

    pub fn upsert_position(&self, position: AgentPosition) {
        self.positions.write().insert(position.id.clone(), position);
    }

    pub fn remove_position(&self, id: &str) -> Option<AgentPosition> {
        self.positions.write().remove(id)
    }

    pub fn positions_for_agent(&self, agent_id: &str) -> Vec<AgentPosition> {
        self.positions
            .read()
            .values()
            .filter(|p| p.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub fn all_positions(&self) -> Vec<AgentPosition> {
        self.positions.read().values().cloned().collect()
    }

    // ── Trades / decisions ───────────────────────────────────────────────

    pub fn insert_trade(&self, trade: AgentTrade) {
        self.trades.write().push(trade);
    }

    pub fn trades_for_agent(&self, agent_id: &str) -> Vec<AgentTrade> {
        self.trades.read().iter().filter(|t| t.agent_id == agent_id).cloned().collect()
    }

    pub fn insert_decision(&self, decision: AgentDecision) {
        self.decisions.write().push(decision);
    }

    pub fn decisions_for_agent(&self, agent_id: &str) -> Vec<AgentDecision> {
        self.decisions
            .read()
            .iter()
            .filter(|d| d.agent_id == agent_id)
            .cloned()
            .collect()
    }

    // ── Token usage ──────────────────────────────────────────────────────

    /// Add to the running total for (agent, model, task_type, date),
    /// creating the row on first use.
    pub fn record_token_usage(
        &self,
        agent_id: &str,
        model: &str,
        task_type: &str,
        date: chrono::NaiveDate,
        prompt_tokens: u64,
        completion_tokens: u64,
        cost: f64,
    ) {
        let key = (agent_id.to_string(), model.to_string(), task_type.to_string(), date);
        let mut table = self.token_usage.write();
        table
            .entry(key)
            .and_modify(|row| {
                row.prompt_tokens += prompt_tokens;
                row.completion_tokens += completion_tokens;
                row.cost += cost;
            })
            .or_insert(AgentTokenUsage {
                agent_id: agent_id.to_string(),
                model: model.to_string(),
                task_type: task_type.to_string(),
                date,
                prompt_tokens,
                completion_tokens,
                cost,
            });
    }

    pub fn token_usage_for_agent(&self, agent_id: &str) -> Vec<AgentTokenUsage> {
        self.token_usage.read().values().filter(|u| u.agent_id == agent_id).cloned().collect()
    }

    // ── Backtests ────────────────────────────────────────────────────────

    pub fn insert_backtest_run(&self, run: BacktestRun) {
        self.backtest_runs.write().insert(run.id.clone(), run);
    }

    pub fn update_backtest_run<F: FnOnce(&mut BacktestRun)>(&self, id: &str, f: F) {
        if let Some(run) = self.backtest_runs.write().get_mut(id) {
            f(run);
        }
    }

    pub fn get_backtest_run(&self, id: &str) -> Option<BacktestRun> {
        self.backtest_runs.read().get(id).cloned()
    }

    pub fn insert_backtest_trade(&self, trade: BacktestTrade) {
        self.backtest_trades.write().push(trade);
    }

    pub fn trades_for_backtest_run(&self, run_id: &str) -> Vec<BacktestTrade> {
        self.backtest_trades.read().iter().filter(|t| t.run_id == run_id).cloned().collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
