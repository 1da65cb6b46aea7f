// =============================================================================
// Backtest Engine (C11)
// =============================================================================
//
// Replays one strategy against one symbol and timeframe over a date range.
// `SimPortfolio` is a self-contained mirror of the Portfolio Manager (C8):
// same fee/sizing/SL-TP math from `portfolio::position`, but in-memory only
// — no `Store` writes until the run engine persists the finished run and
// its trades in one shot. Scoping it to a single symbol means the position
// table never needs more than one entry, but it is kept as a map for the
// same "what if this were multi-symbol" shape the live manager uses.
// =============================================================================

pub mod engine;

pub use engine::{run, BacktestConfig, CancelToken};

use std::collections::HashMap;

use crate::store::AgentPosition;
use crate::types::{Direction, ExitReason};

use crate::portfolio::position::{
    derive_sl_tp, duration_minutes, fee, long_sl_hit, long_tp_hit, notional, pnl, short_sl_hit,
    short_tp_hit, MAX_CONCURRENT_POSITIONS, MAX_POSITION_SIZE_PCT,
};

#[derive(Debug, Clone)]
pub struct SimPosition {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: i64,
}

#[derive(Debug, Clone)]
pub struct SimTrade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub opened_at: i64,
    pub closed_at: i64,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct EquitySnapshot {
    pub timestamp: i64,
    pub equity: f64,
}

/// Final aggregate stats over a completed replay, mirroring the fields a
/// `BacktestRun` row persists.
#[derive(Debug, Clone)]
pub struct BacktestStats {
    pub final_equity: f64,
    pub total_pnl: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: Option<f64>,
    pub equity_curve: Vec<(i64, f64)>,
}

pub struct SimPortfolio {
    pub cash: f64,
    pub initial_balance: f64,
    positions: HashMap<String, SimPosition>,
    pub trades: Vec<SimTrade>,
    pub equity_curve: Vec<EquitySnapshot>,
    peak_equity: f64,
}

impl SimPortfolio {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            cash: initial_balance,
            initial_balance,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: initial_balance,
        }
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = &SimPosition> {
        self.positions.values()
    }

    fn calc_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let mut equity = self.cash;
        for position in self.positions.values() {
            let price = prices.get(&position.symbol).copied().unwrap_or(position.entry_price);
            equity += position.size + pnl(position.direction, position.entry_price, price, position.size);
        }
        equity
    }

    /// Total equity (cash plus open-position notional and unrealized PnL)
    /// marked at `prices`.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        self.calc_equity(prices)
    }

    /// Cash available for a new position, respecting the concurrency cap
    /// and the per-position size ceiling — zero once either is exhausted.
    pub fn available_for_new_position(&self, prices: &HashMap<String, f64>) -> f64 {
        if self.positions.len() >= MAX_CONCURRENT_POSITIONS {
            return 0.0;
        }
        let equity = self.calc_equity(prices);
        self.cash.min(equity * MAX_POSITION_SIZE_PCT).max(0.0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        symbol: &str,
        direction: Direction,
        price: f64,
        size_pct: f64,
        sl_pct: f64,
        tp_pct: f64,
        timestamp: i64,
        prices: &HashMap<String, f64>,
    ) -> bool {
        if self.positions.contains_key(symbol) || self.positions.len() >= MAX_CONCURRENT_POSITIONS {
            return false;
        }

        let equity = self.calc_equity(prices);
        let position_size = notional(equity, size_pct.min(MAX_POSITION_SIZE_PCT));
        let entry_fee = fee(position_size);
        if self.cash < position_size + entry_fee {
            return false;
        }

        let (stop_loss, take_profit) = derive_sl_tp(direction, price, sl_pct, tp_pct);

        self.positions.insert(
            symbol.to_string(),
            SimPosition {
                symbol: symbol.to_string(),
                direction,
                entry_price: price,
                size: position_size,
                stop_loss: if sl_pct > 0.0 { Some(stop_loss) } else { None },
                take_profit: if tp_pct > 0.0 { Some(take_profit) } else { None },
                opened_at: timestamp,
            },
        );
        self.cash -= position_size + entry_fee;
        true
    }

    pub fn close_position(&mut self, symbol: &str, price: f64, reason: ExitReason, timestamp: i64) -> Option<SimTrade> {
        let position = self.positions.remove(symbol)?;

        let gross_pnl = pnl(position.direction, position.entry_price, price, position.size);
        let exit_fee = fee(position.size);
        let net_pnl = gross_pnl - exit_fee;

        let trade = SimTrade {
            symbol: position.symbol,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: price,
            size: position.size,
            pnl: net_pnl,
            fees: exit_fee,
            exit_reason: reason,
            opened_at: position.opened_at,
            closed_at: timestamp,
            duration_minutes: duration_minutes(position.opened_at, timestamp),
        };
        self.cash += position.size + net_pnl;
        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Checks stop-loss before take-profit for every open position against
    /// the current candle's high/low, same ordering as the live manager.
    pub fn check_stop_loss_take_profit(
        &mut self,
        candle_data: &HashMap<String, crate::candle::Candle>,
        timestamp: i64,
    ) -> Vec<SimTrade> {
        let mut closed = Vec::new();
        let symbols: Vec<String> = self.positions.keys().cloned().collect();

        for symbol in symbols {
            let Some(position) = self.positions.get(&symbol) else {
                continue;
            };
            let Some(candle) = candle_data.get(&symbol) else {
                continue;
            };

            let sl_hit = position.stop_loss.is_some_and(|sl| match position.direction {
                Direction::Long => long_sl_hit(sl, candle.low),
                Direction::Short => short_sl_hit(sl, candle.high),
            });
            if sl_hit {
                let sl = position.stop_loss.expect("checked above");
                if let Some(trade) = self.close_position(&symbol, sl, ExitReason::StopLoss, timestamp) {
                    closed.push(trade);
                }
                continue;
            }

            let tp_hit = position.take_profit.is_some_and(|tp| match position.direction {
                Direction::Long => long_tp_hit(tp, candle.high),
                Direction::Short => short_tp_hit(tp, candle.low),
            });
            if tp_hit {
                let tp = position.take_profit.expect("checked above");
                if let Some(trade) = self.close_position(&symbol, tp, ExitReason::TakeProfit, timestamp) {
                    closed.push(trade);
                }
            }
        }

        closed
    }

    pub fn update_equity(&mut self, prices: &HashMap<String, f64>, timestamp: i64) {
        let equity = self.calc_equity(prices);
        self.peak_equity = self.peak_equity.max(equity);
        self.equity_curve.push(EquitySnapshot { timestamp, equity });
    }

    /// Synthesizes `AgentPosition` rows for the strategy's `PortfolioSummary`
    /// — the same shape a live agent's context sees, minus a real row id.
    pub fn open_position_rows(&self) -> Vec<AgentPosition> {
        self.positions
            .values()
            .map(|p| AgentPosition {
                id: String::new(),
                agent_id: String::new(),
                symbol: p.symbol.clone(),
                direction: p.direction,
                entry_price: p.entry_price,
                size: p.size,
                stop_loss: p.stop_loss,
                take_profit: p.take_profit,
                opened_at: p.opened_at,
                unrealized_pnl: 0.0,
            })
            .collect()
    }

    pub fn get_stats(&self) -> BacktestStats {
        let total_trades = self.trades.len() as u32;
        let winning_trades = self.trades.iter().filter(|t| t.pnl > 0.0).count() as u32;

        let final_equity = self.equity_curve.last().map(|s| s.equity).unwrap_or(self.initial_balance);
        let total_pnl = final_equity - self.initial_balance;

        let mut peak = self.initial_balance;
        let mut max_drawdown = 0.0_f64;
        for snapshot in &self.equity_curve {
            peak = peak.max(snapshot.equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - snapshot.equity) / peak);
            }
        }

        let sharpe_ratio = sharpe_ratio(&self.equity_curve);

        BacktestStats {
            final_equity,
            total_pnl,
            total_trades,
            winning_trades,
            max_drawdown_pct: max_drawdown * 100.0,
            sharpe_ratio,
            equity_curve: self.equity_curve.iter().map(|s| (s.timestamp, s.equity)).collect(),
        }
    }
}

/// Mean-over-stddev of bar-over-bar equity returns, unannualized beyond the
/// `sqrt(n)` scaling the original implementation used — `None` when there
/// are fewer than two snapshots or the returns have no variance.
fn sharpe_ratio(equity_curve: &[EquitySnapshot]) -> Option<f64> {
    if equity_curve.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter_map(|pair| {
            let (prev, cur) = (pair[0].equity, pair[1].equity);
            if prev > 0.0 {
                Some((cur - prev) / prev)
            } else {
                None
            }
        })
        .collect();
    if returns.is_empty() {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return None;
    }

    Some((mean / std_dev) * (returns.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;

    fn prices(symbol: &str, price: f64) -> HashMap<String, f64> {
        HashMap::from([(symbol.to_string(), price)])
    }

    #[test]
    fn open_then_close_round_trips_cash_with_profit() {
        let mut pf = SimPortfolio::new(10_000.0);
        let opened = pf.open_position("BTCUSDT", Direction::Long, 100.0, 0.1, 0.04, 0.06, 0, &prices("BTCUSDT", 100.0));
        assert!(opened);
        assert_eq!(pf.position_count(), 1);

        let trade = pf.close_position("BTCUSDT", 110.0, ExitReason::TakeProfit, 60_000).unwrap();
        assert!(trade.pnl > 0.0);
        assert_eq!(pf.position_count(), 0);
    }

    #[test]
    fn cannot_open_second_position_in_same_symbol() {
        let mut pf = SimPortfolio::new(10_000.0);
        pf.open_position("BTCUSDT", Direction::Long, 100.0, 0.1, 0.04, 0.06, 0, &prices("BTCUSDT", 100.0));
        let second = pf.open_position("BTCUSDT", Direction::Long, 101.0, 0.1, 0.04, 0.06, 0, &prices("BTCUSDT", 100.0));
        assert!(!second);
    }

    #[test]
    fn sl_before_tp_closes_first_hit_only() {
        let mut pf = SimPortfolio::new(10_000.0);
        pf.open_position("BTCUSDT", Direction::Long, 100.0, 0.1, 0.04, 0.06, 0, &prices("BTCUSDT", 100.0));
        let candle = Candle::new(0, 100.0, 107.0, 95.0, 96.0, 1.0, 0, 1.0, 1);
        let closed = pf.check_stop_loss_take_profit(&HashMap::from([("BTCUSDT".to_string(), candle)]), 1);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn get_stats_reports_final_equity_and_drawdown() {
        let mut pf = SimPortfolio::new(10_000.0);
        pf.update_equity(&prices("BTCUSDT", 100.0), 0);
        pf.update_equity(&prices("BTCUSDT", 100.0), 1);
        pf.open_position("BTCUSDT", Direction::Long, 100.0, 0.1, 0.04, 0.06, 1, &prices("BTCUSDT", 100.0));
        pf.close_position("BTCUSDT", 90.0, ExitReason::StopLoss, 2);
        pf.update_equity(&prices("BTCUSDT", 100.0), 2);

        let stats = pf.get_stats();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.winning_trades, 0);
        assert!(stats.max_drawdown_pct > 0.0);
        assert_eq!(stats.equity_curve.len(), 3);
    }

    #[test]
    fn available_for_new_position_is_zero_once_cash_exhausted() {
        let mut pf = SimPortfolio::new(1_000.0);
        for i in 0..MAX_CONCURRENT_POSITIONS {
            let symbol = format!("SYM{i}USDT");
            pf.open_position(&symbol, Direction::Long, 10.0, 0.2, 0.04, 0.06, 0, &prices(&symbol, 10.0));
        }
        assert_eq!(pf.available_for_new_position(&HashMap::new()), 0.0);
    }
}
