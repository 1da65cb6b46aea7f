// =============================================================================
// Backtest run engine (C11)
// =============================================================================
//
// Fetches one symbol/timeframe's history, replays it bar by bar through the
// same rule strategy engine (C9) live agents use, and persists the finished
// run plus its trades to the store in one shot. The bar loop itself never
// touches the store — `SimPortfolio` carries all state until the run ends
// or is cancelled, at which point whatever it accumulated is written once.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::exchange::ExchangeClient;
use crate::ranker::{rank_single, RankedSnapshot, ScoredSymbol};
use crate::store::{BacktestTrade, Store};
use crate::strategy::{AgentContext, Archetype, PerformanceStats, PortfolioSummary};
use crate::types::{ActionKind, BacktestStatus, Direction, ExitReason, Timeframe, TradeAction};

use super::SimPortfolio;

const WARMUP_BARS: usize = 200;
const MIN_CANDLES: usize = WARMUP_BARS + 10;
const DEFAULT_SIZE_PCT: f64 = 0.10;
const YIELD_EVERY: usize = 50;
const ERROR_MESSAGE_MAX_LEN: usize = 2000;

/// Replay parameters for one run.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub strategy: String,
    pub timeframe: Timeframe,
    pub symbol: String,
    pub start_date: i64,
    pub end_date: i64,
    pub initial_balance: f64,
}

/// Cooperative cancellation signal, checked at the periodic yield points —
/// a plain shared flag in the same style as the store's per-timeframe lock.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Completed(SimPortfolio),
    Cancelled(SimPortfolio),
}

/// Runs `config` to completion (or cancellation) and writes the result into
/// `run_id`'s `BacktestRun` row plus one `BacktestTrade` row per trade the
/// mirror portfolio closed. `run_id` must already exist in `Running` or
/// `Pending` status.
#[instrument(skip(store, exchange, config, cancel), fields(run_id = %run_id, symbol = %config.symbol, strategy = %config.strategy))]
pub async fn run(store: &Store, exchange: &ExchangeClient, config: BacktestConfig, run_id: String, cancel: CancelToken) {
    store.update_backtest_run(&run_id, |r| r.status = BacktestStatus::Running);

    match execute(exchange, &config, &cancel).await {
        Ok(Outcome::Completed(portfolio)) => {
            let stats = portfolio.get_stats();
            persist_trades(store, &run_id, &portfolio);
            store.update_backtest_run(&run_id, |r| {
                r.status = BacktestStatus::Completed;
                r.final_equity = Some(stats.final_equity);
                r.total_pnl = Some(stats.total_pnl);
                r.total_trades = Some(stats.total_trades);
                r.winning_trades = Some(stats.winning_trades);
                r.max_drawdown_pct = Some(stats.max_drawdown_pct);
                r.sharpe_ratio = stats.sharpe_ratio;
                r.equity_curve = stats.equity_curve;
                r.completed_at = Some(Utc::now().timestamp_millis());
            });
            info!(run_id, trades = stats.total_trades, pnl = stats.total_pnl, "backtest completed");
        }
        Ok(Outcome::Cancelled(portfolio)) => {
            persist_trades(store, &run_id, &portfolio);
            store.update_backtest_run(&run_id, |r| {
                r.status = BacktestStatus::Cancelled;
                r.error = Some("cancelled by caller".to_string());
                r.completed_at = Some(Utc::now().timestamp_millis());
            });
            info!(run_id, "backtest cancelled");
        }
        Err(e) => {
            let message: String = e.to_string().chars().take(ERROR_MESSAGE_MAX_LEN).collect();
            warn!(run_id, error = %message, "backtest failed");
            store.update_backtest_run(&run_id, |r| {
                r.status = BacktestStatus::Failed;
                r.error = Some(message);
                r.completed_at = Some(Utc::now().timestamp_millis());
            });
        }
    }
}

fn persist_trades(store: &Store, run_id: &str, portfolio: &SimPortfolio) {
    for trade in &portfolio.trades {
        store.insert_backtest_trade(BacktestTrade {
            run_id: run_id.to_string(),
            symbol: trade.symbol.clone(),
            direction: trade.direction,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            position_size: trade.size,
            pnl: trade.pnl,
            fees: trade.fees,
            exit_reason: trade.exit_reason,
            entry_at: trade.opened_at,
            exit_at: trade.closed_at,
            duration_minutes: trade.duration_minutes,
        });
    }
}

async fn execute(exchange: &ExchangeClient, config: &BacktestConfig, cancel: &CancelToken) -> Result<Outcome, EngineError> {
    let Some(archetype) = Archetype::from_str_name(&config.strategy) else {
        return Err(EngineError::Validation { reason: format!("unknown strategy archetype: {}", config.strategy) });
    };

    let warmup_ms = WARMUP_BARS as i64 * config.timeframe.bar_duration_ms();
    let fetch_start = config.start_date - warmup_ms;
    let candles = exchange
        .fetch_historical_candles(&config.symbol, config.timeframe.interval_str(), fetch_start, config.end_date)
        .await?;

    if candles.len() < MIN_CANDLES {
        return Err(EngineError::InsufficientData {
            reason: format!("got {} candles, need at least {MIN_CANDLES}", candles.len()),
        });
    }

    let mut portfolio = SimPortfolio::new(config.initial_balance);

    for i in WARMUP_BARS..candles.len() {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled(portfolio));
        }
        if i % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }

        let candle = candles[i];
        let window = candles[..=i].to_vec();
        let close_price = candle.close;
        let prices = HashMap::from([(config.symbol.clone(), close_price)]);

        let scored = ScoredSymbol {
            symbol: config.symbol.clone(),
            candles: window,
            quote_volume_24h: 0.0,
            funding_rate: None,
        };
        let ranking = rank_single(&scored, config.timeframe.interval_str(), "backtest", candle.open_time);

        let candle_data = HashMap::from([(config.symbol.clone(), candle)]);
        portfolio.check_stop_loss_take_profit(&candle_data, candle.open_time);

        let context = build_context(&portfolio, vec![ranking], &prices);
        let action = archetype.evaluate(&context);
        apply_action(&mut portfolio, &config.symbol, &action, close_price, candle.open_time, &prices);

        portfolio.update_equity(&prices, candle.open_time);
    }

    if let Some(last) = candles.last().copied() {
        let open_symbols: Vec<String> = portfolio.positions().map(|p| p.symbol.clone()).collect();
        for symbol in open_symbols {
            portfolio.close_position(&symbol, last.close, ExitReason::BacktestEnd, last.open_time);
        }
        portfolio.update_equity(&HashMap::from([(config.symbol.clone(), last.close)]), last.open_time);
    }

    Ok(Outcome::Completed(portfolio))
}

fn apply_action(
    portfolio: &mut SimPortfolio,
    config_symbol: &str,
    action: &TradeAction,
    price: f64,
    timestamp: i64,
    prices: &HashMap<String, f64>,
) {
    match action.action {
        ActionKind::OpenLong | ActionKind::OpenShort => {
            let Some(symbol) = action.symbol.as_deref() else {
                return;
            };
            if symbol != config_symbol {
                return;
            }
            let direction = if action.action == ActionKind::OpenLong { Direction::Long } else { Direction::Short };
            let size_pct = if action.size_pct > 0.0 { action.size_pct } else { DEFAULT_SIZE_PCT };
            portfolio.open_position(symbol, direction, price, size_pct, action.sl_pct, action.tp_pct, timestamp, prices);
        }
        ActionKind::Close => {
            let Some(symbol) = action.symbol.as_deref() else {
                return;
            };
            if symbol != config_symbol {
                return;
            }
            portfolio.close_position(symbol, price, ExitReason::AgentDecision, timestamp);
        }
        ActionKind::Hold => {}
    }
}

/// A minimal `AgentContext` scoped to one symbol — no cross-timeframe or
/// tweet bundle, since a backtest run only ever drives the technical
/// archetypes against a single candidate.
fn build_context(portfolio: &SimPortfolio, rankings: Vec<RankedSnapshot>, prices: &HashMap<String, f64>) -> AgentContext {
    AgentContext {
        agent_id: "backtest".to_string(),
        portfolio: PortfolioSummary {
            cash_balance: portfolio.cash,
            total_equity: portfolio.equity(prices),
            positions: portfolio.open_position_rows(),
            available_for_new_position: portfolio.available_for_new_position(prices),
        },
        performance: performance_stats(portfolio),
        primary_timeframe_rankings: rankings,
        cross_timeframe: None,
        tweet: None,
        current_prices: prices.clone(),
        recent_memory: Vec::new(),
    }
}

fn performance_stats(portfolio: &SimPortfolio) -> PerformanceStats {
    let trades = &portfolio.trades;
    if trades.is_empty() {
        return PerformanceStats::default();
    }

    let total_trades = trades.len() as u32;
    let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count() as u32;
    let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count() as u32;
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let avg_pnl_per_trade = total_pnl / total_trades as f64;
    let win_rate = winning_trades as f64 / total_trades as f64;

    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for trade in trades {
        cumulative += trade.pnl;
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

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn apply_action_ignores_symbol_mismatch() {
        let mut portfolio = SimPortfolio::new(10_000.0);
        let action = TradeAction {
            action: ActionKind::OpenLong,
            symbol: Some("ETHUSDT".to_string()),
            size_pct: 0.1,
            sl_pct: 0.04,
            tp_pct: 0.06,
            confidence: 0.9,
            reasoning: "test".into(),
        };
        apply_action(&mut portfolio, "BTCUSDT", &action, 100.0, 0, &HashMap::new());
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn apply_action_opens_matching_symbol() {
        let mut portfolio = SimPortfolio::new(10_000.0);
        let action = TradeAction {
            action: ActionKind::OpenLong,
            symbol: Some("BTCUSDT".to_string()),
            size_pct: 0.1,
            sl_pct: 0.04,
            tp_pct: 0.06,
            confidence: 0.9,
            reasoning: "test".into(),
        };
        let prices = HashMap::from([("BTCUSDT".to_string(), 100.0)]);
        apply_action(&mut portfolio, "BTCUSDT", &action, 100.0, 0, &prices);
        assert_eq!(portfolio.position_count(), 1);
    }

    #[test]
    fn performance_stats_empty_portfolio_is_default() {
        let portfolio = SimPortfolio::new(10_000.0);
        let stats = performance_stats(&portfolio);
        assert_eq!(stats.total_trades, 0);
    }

    #[tokio::test]
    async fn execute_rejects_unknown_archetype() {
        let exchange = ExchangeClient::new("http://localhost:0");
        let cancel = CancelToken::new();
        let config = BacktestConfig {
            strategy: "not_a_real_archetype".to_string(),
            timeframe: Timeframe::H1,
            symbol: "BTCUSDT".to_string(),
            start_date: 0,
            end_date: 0,
            initial_balance: 10_000.0,
        };
        let result = execute(&exchange, &config, &cancel).await;
        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }
}
