// =============================================================================
// Context Builder (C10 support)
// =============================================================================
//
// Assembles an `AgentContext` from the live `Store` for one agent cycle.
// Nothing here is cached — portfolio totals, performance stats, and the
// cross-timeframe bundle are all recomputed from scratch every call, the
// same "always rebuild" shape the original context builder used against a
// database.
// =============================================================================

use std::collections::HashMap;

use crate::portfolio::position::MAX_CONCURRENT_POSITIONS;
use crate::store::{Agent, Store};
use crate::strategy::{AgentContext, CrossTimeframeContext, PerformanceStats, PortfolioSummary, RegimeTag, TweetContext};
use crate::types::{AgentSource, Regime, Timeframe};

const TOP_N_RANKINGS: usize = 50;
const CONFLUENCE_TOP_N: usize = 10;
const CONFLUENCE_MIN_TIMEFRAMES: usize = 3;
const CONFLUENCE_MAX_RESULT: usize = 5;
const MAX_POSITION_SIZE_PCT: f64 = 0.25;

/// `available_for_new_position = min(cash, 0.25 * equity)` when a slot is
/// free, `0` otherwise — the cap the orchestrator hands agents, not one
/// they re-derive themselves.
fn build_portfolio_summary(store: &Store, agent_id: &str) -> PortfolioSummary {
    let positions = store.positions_for_agent(agent_id);
    let Some(portfolio) = store.get_portfolio(agent_id) else {
        return PortfolioSummary {
            cash_balance: 0.0,
            total_equity: 0.0,
            positions,
            available_for_new_position: 0.0,
        };
    };

    let available = if positions.len() < MAX_CONCURRENT_POSITIONS {
        portfolio.cash_balance.min(portfolio.total_equity * MAX_POSITION_SIZE_PCT).max(0.0)
    } else {
        0.0
    };

    PortfolioSummary {
        cash_balance: portfolio.cash_balance,
        total_equity: portfolio.total_equity,
        positions,
        available_for_new_position: available,
    }
}

fn build_performance_stats(store: &Store, agent_id: &str) -> PerformanceStats {
    let mut trades = store.trades_for_agent(agent_id);
    if trades.is_empty() {
        return PerformanceStats::default();
    }
    trades.sort_by_key(|t| t.closed_at);

    let total_trades = trades.len() as u32;
    let winning_trades = trades.iter().filter(|t| t.realized_pnl > 0.0).count() as u32;
    let losing_trades = trades.iter().filter(|t| t.realized_pnl < 0.0).count() as u32;
    let total_pnl: f64 = trades.iter().map(|t| t.realized_pnl).sum();
    let avg_pnl_per_trade = total_pnl / total_trades as f64;
    let win_rate = winning_trades as f64 / total_trades as f64;

    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for trade in &trades {
        cumulative += trade.realized_pnl;
        peak = peak.max(cumulative);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - cumulative) / peak);
        }
    }

    let total_duration_minutes: i64 = trades.iter().map(|t| t.duration_minutes).sum();
    let avg_trade_duration_hours = Some(total_duration_minutes as f64 / total_trades as f64 / 60.0);

    PerformanceStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        total_pnl,
        avg_pnl_per_trade,
        max_drawdown,
        avg_trade_duration_hours,
    }
}

/// The timeframe one step above `tf` in the cadence table, clamped at `W1`
/// — the "higher-timeframe regime" the cross-timeframe archetypes gate on.
fn higher_timeframe(tf: Timeframe) -> Timeframe {
    match tf {
        Timeframe::M15 => Timeframe::M30,
        Timeframe::M30 => Timeframe::H1,
        Timeframe::H1 => Timeframe::H4,
        Timeframe::H4 => Timeframe::D1,
        Timeframe::D1 => Timeframe::W1,
        Timeframe::W1 => Timeframe::W1,
    }
}

fn regime_tag(regime: Regime) -> RegimeTag {
    match regime {
        Regime::TrendingBull => RegimeTag::Bull,
        Regime::TrendingBear => RegimeTag::Bear,
        Regime::Ranging => RegimeTag::Ranging,
        Regime::Volatile => RegimeTag::Volatile,
    }
}

/// Scans the top 10 snapshots of every timeframe for symbols scoring above
/// 0.6 (bullish) or below 0.4 (bearish) on at least 3 of them, and reads the
/// higher-timeframe regime call for `primary_timeframe`.
fn build_cross_timeframe(store: &Store, primary_timeframe: Timeframe) -> CrossTimeframeContext {
    let mut scores: HashMap<String, HashMap<Timeframe, f64>> = HashMap::new();

    for tf in Timeframe::ALL {
        for ranking in store.latest_snapshots(tf).into_iter().take(CONFLUENCE_TOP_N) {
            scores.entry(ranking.symbol.clone()).or_default().insert(tf, ranking.bullish_score);
        }
    }

    let mut bullish_confluence = Vec::new();
    let mut bearish_confluence = Vec::new();
    for (symbol, per_tf) in &scores {
        if per_tf.len() < CONFLUENCE_MIN_TIMEFRAMES {
            continue;
        }
        let bullish_count = per_tf.values().filter(|&&s| s > 0.6).count();
        let bearish_count = per_tf.values().filter(|&&s| s < 0.4).count();
        if bullish_count >= CONFLUENCE_MIN_TIMEFRAMES {
            bullish_confluence.push(symbol.clone());
        } else if bearish_count >= CONFLUENCE_MIN_TIMEFRAMES {
            bearish_confluence.push(symbol.clone());
        }
    }
    bullish_confluence.sort();
    bearish_confluence.sort();
    bullish_confluence.truncate(CONFLUENCE_MAX_RESULT);
    bearish_confluence.truncate(CONFLUENCE_MAX_RESULT);

    let (higher_tf_regime, higher_tf_confidence) = match store.get_timeframe_regime(higher_timeframe(primary_timeframe)) {
        Some(row) => (Some(regime_tag(row.regime)), row.confidence),
        None => (None, 0),
    };

    CrossTimeframeContext { bullish_confluence, bearish_confluence, scores, higher_tf_regime, higher_tf_confidence }
}

/// Assembles the full per-cycle context for one agent.
///
/// `tweet` is always an empty `TweetContext` for `tweet`/`hybrid` sourced
/// agents and `None` for `technical` ones — tweet ingestion is an external
/// collaborator this core never talks to, so every tweet/hybrid strategy
/// sees the same "no signals this cycle" input the live system would
/// produce on a quiet day. `recent_memory` is always empty: no memory table
/// is persisted by this store (see the ledger).
pub fn build(store: &Store, agent: &Agent, current_prices: HashMap<String, f64>) -> AgentContext {
    let portfolio = build_portfolio_summary(store, &agent.id);
    let performance = build_performance_stats(store, &agent.id);
    let primary_timeframe_rankings: Vec<_> =
        store.latest_snapshots(agent.primary_timeframe).into_iter().take(TOP_N_RANKINGS).collect();
    let cross_timeframe = Some(build_cross_timeframe(store, agent.primary_timeframe));
    let tweet = match agent.source {
        AgentSource::Tweet | AgentSource::Hybrid => Some(TweetContext::default()),
        AgentSource::Technical => None,
    };

    AgentContext {
        agent_id: agent.id.clone(),
        portfolio,
        performance,
        primary_timeframe_rankings,
        cross_timeframe,
        tweet,
        current_prices,
        recent_memory: Vec::new(),
    }
}
