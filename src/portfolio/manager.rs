// =============================================================================
// Portfolio Manager (C8)
// =============================================================================
//
// Authoritative over every mutation to portfolio, position, and trade state.
// Every public method here takes and releases the relevant store write lock
// for the duration of its own mutation — that is what "one transaction per
// agent cycle" means in an in-process store (see `store.rs`'s module doc).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::candle::Candle;
use crate::error::EngineError;
use crate::notifier::{NotificationEvent, Notifier};
use crate::store::{AgentPortfolio, AgentPosition, AgentTrade, Store};
use crate::types::{ActionKind, Direction, ExitReason, TradeAction};

use super::position::{
    derive_sl_tp, duration_minutes, fee, long_sl_hit, long_tp_hit, notional, pnl, short_sl_hit,
    short_tp_hit, MAX_CONCURRENT_POSITIONS, MAX_POSITION_SIZE_PCT, RECONCILE_TOLERANCE,
};

/// Result of `validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self { valid: true, error_message: None, warnings: Vec::new() }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, error_message: Some(reason.into()), warnings: Vec::new() }
    }
}

/// Result of `open_position` / `close_position`.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub position: Option<AgentPosition>,
    pub trade: Option<AgentTrade>,
    pub error: Option<EngineError>,
}

impl ExecutionResult {
    fn failure(error: EngineError) -> Self {
        Self { success: false, position: None, trade: None, error: Some(error) }
    }
}

/// Result of `reconcile`: read-only comparison of bookkept vs. recomputed
/// totals, covering both invariants in §8 — realized PnL against the sum of
/// closed trades, and total equity against cash plus open-position value.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileReport {
    pub expected_realized_pnl: f64,
    pub actual_realized_pnl: f64,
    pub pnl_discrepancy: f64,
    pub expected_equity: f64,
    pub actual_equity: f64,
    pub equity_discrepancy: f64,
    pub within_tolerance: bool,
}

pub struct PortfolioManager {
    store: Arc<Store>,
    notifier: Arc<dyn Notifier>,
}

impl PortfolioManager {
    pub fn new(store: Arc<Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, action, current_prices))]
    pub fn validate(
        &self,
        agent_id: &str,
        action: &TradeAction,
        current_prices: &HashMap<String, f64>,
    ) -> ValidationResult {
        match action.action {
            ActionKind::Hold => ValidationResult::ok(),
            ActionKind::OpenLong | ActionKind::OpenShort => {
                let Some(symbol) = &action.symbol else {
                    return ValidationResult::invalid("open action carries no symbol");
                };
                let Some(&price) = current_prices.get(symbol) else {
                    return ValidationResult::invalid(format!("no current price for {symbol}"));
                };

                let positions = self.store.positions_for_agent(agent_id);
                if positions.len() >= MAX_CONCURRENT_POSITIONS {
                    return ValidationResult::invalid("max concurrent positions reached");
                }
                if positions.iter().any(|p| &p.symbol == symbol) {
                    return ValidationResult::invalid(format!("already holding a position in {symbol}"));
                }
                if action.size_pct > MAX_POSITION_SIZE_PCT {
                    return ValidationResult::invalid(format!(
                        "size_pct {} exceeds max {}",
                        action.size_pct, MAX_POSITION_SIZE_PCT
                    ));
                }

                let Some(portfolio) = self.store.get_portfolio(agent_id) else {
                    return ValidationResult::invalid("no portfolio for agent");
                };
                let required_notional = notional(portfolio.total_equity, action.size_pct);
                let required_cash = required_notional + 2.0 * fee(required_notional);
                if portfolio.cash_balance < required_cash {
                    return ValidationResult::invalid("insufficient cash for entry and reserved exit fee");
                }

                let _ = price;
                let mut warnings = Vec::new();
                if action.confidence < 0.5 {
                    warnings.push(format!("low-confidence action ({:.2})", action.confidence));
                }
                ValidationResult { valid: true, error_message: None, warnings }
            }
            ActionKind::Close => {
                let Some(symbol) = &action.symbol else {
                    return ValidationResult::invalid("close action carries no symbol");
                };
                let positions = self.store.positions_for_agent(agent_id);
                if positions.iter().any(|p| &p.symbol == symbol) {
                    ValidationResult::ok()
                } else {
                    ValidationResult::invalid(format!("no open position in {symbol}"))
                }
            }
        }
    }

    #[instrument(skip(self, action))]
    pub fn open_position(
        &self,
        agent_id: &str,
        action: &TradeAction,
        current_price: f64,
    ) -> ExecutionResult {
        let Some(symbol) = action.symbol.clone() else {
            return ExecutionResult::failure(EngineError::Validation {
                reason: "open action carries no symbol".into(),
            });
        };
        let direction = match action.action {
            ActionKind::OpenLong => Direction::Long,
            ActionKind::OpenShort => Direction::Short,
            _ => {
                return ExecutionResult::failure(EngineError::Validation {
                    reason: "open_position called with a non-open action".into(),
                })
            }
        };

        let Some(mut portfolio) = self.store.get_portfolio(agent_id) else {
            return ExecutionResult::failure(EngineError::Validation {
                reason: "no portfolio for agent".into(),
            });
        };

        let position_notional = notional(portfolio.total_equity, action.size_pct);
        let entry_fee = fee(position_notional);
        let (stop_loss, take_profit) = derive_sl_tp(direction, current_price, action.sl_pct, action.tp_pct);

        portfolio.cash_balance -= position_notional + entry_fee;
        portfolio.total_fees_paid += entry_fee;
        portfolio.updated_at = Utc::now().timestamp_millis();
        self.store.upsert_portfolio(portfolio);

        let position = AgentPosition {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            symbol: symbol.clone(),
            direction,
            entry_price: current_price,
            size: position_notional,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            opened_at: Utc::now().timestamp_millis(),
            unrealized_pnl: 0.0,
        };
        self.store.upsert_position(position.clone());

        self.notifier.notify(NotificationEvent::TradeOpened {
            agent_id: agent_id.to_string(),
            symbol,
            direction: direction.to_string(),
            size: position_notional,
        });

        ExecutionResult { success: true, position: Some(position), trade: None, error: None }
    }

    /// `decision_id` is attached to the resulting trade's `decision_ids`
    /// when the close was strategy-driven; passive SL/TP and force-closes
    /// pass `None` since no `AgentDecision` row exists for them.
    #[instrument(skip(self))]
    pub fn close_position(
        &self,
        agent_id: &str,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
        decision_id: Option<&str>,
    ) -> ExecutionResult {
        let positions = self.store.positions_for_agent(agent_id);
        let Some(position) = positions.into_iter().find(|p| p.symbol == symbol) else {
            return ExecutionResult::failure(EngineError::Validation {
                reason: format!("no open position in {symbol}"),
            });
        };

        let Some(mut portfolio) = self.store.get_portfolio(agent_id) else {
            return ExecutionResult::failure(EngineError::Validation {
                reason: "no portfolio for agent".into(),
            });
        };

        let gross_pnl = pnl(position.direction, position.entry_price, exit_price, position.size);
        let exit_fee = fee(position.size);
        let net_pnl = gross_pnl - exit_fee;
        let closed_at = Utc::now().timestamp_millis();

        portfolio.cash_balance += position.size + net_pnl;
        portfolio.total_realized_pnl += net_pnl;
        portfolio.total_fees_paid += exit_fee;
        portfolio.updated_at = closed_at;
        self.store.upsert_portfolio(portfolio);

        self.store.remove_position(&position.id);

        let trade = AgentTrade {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            symbol: symbol.to_string(),
            direction: position.direction,
            entry_price: position.entry_price,
            size: position.size,
            exit_price,
            realized_pnl: net_pnl,
            fees_paid: exit_fee,
            exit_reason: reason,
            opened_at: position.opened_at,
            closed_at,
            duration_minutes: duration_minutes(position.opened_at, closed_at),
            decision_ids: decision_id.map(|id| vec![id.to_string()]).unwrap_or_default(),
        };
        self.store.insert_trade(trade.clone());

        self.notifier.notify(NotificationEvent::TradeClosed {
            agent_id: agent_id.to_string(),
            symbol: symbol.to_string(),
            realized_pnl: net_pnl,
            exit_reason: reason.to_string(),
        });

        ExecutionResult { success: true, position: Some(position), trade: Some(trade), error: None }
    }

    #[instrument(skip(self, current_prices))]
    pub fn update_unrealized_pnl(&self, agent_id: &str, current_prices: &HashMap<String, f64>) {
        let positions = self.store.positions_for_agent(agent_id);
        let Some(mut portfolio) = self.store.get_portfolio(agent_id) else {
            return;
        };

        let mut position_value_total = 0.0;
        for mut position in positions {
            if let Some(&price) = current_prices.get(&position.symbol) {
                position.unrealized_pnl = pnl(position.direction, position.entry_price, price, position.size);
                self.store.upsert_position(position.clone());
            }
            position_value_total += position.size + position.unrealized_pnl;
        }

        portfolio.total_equity = portfolio.cash_balance + position_value_total;
        portfolio.peak_equity = portfolio.peak_equity.max(portfolio.total_equity);
        portfolio.trough_equity = portfolio.trough_equity.min(portfolio.total_equity);
        portfolio.updated_at = Utc::now().timestamp_millis();
        self.store.upsert_portfolio(portfolio);
    }

    /// Checks SL before TP per position, closing on the first hit.
    #[instrument(skip(self, candle_data))]
    pub fn check_stop_loss_take_profit(
        &self,
        agent_id: &str,
        candle_data: &HashMap<String, Candle>,
    ) -> Vec<AgentTrade> {
        let mut closed = Vec::new();

        for position in self.store.positions_for_agent(agent_id) {
            let Some(candle) = candle_data.get(&position.symbol) else {
                continue;
            };

            let sl_hit = position.stop_loss.is_some_and(|sl| match position.direction {
                Direction::Long => long_sl_hit(sl, candle.low),
                Direction::Short => short_sl_hit(sl, candle.high),
            });

            if sl_hit {
                let sl = position.stop_loss.expect("checked above");
                let result = self.close_position(agent_id, &position.symbol, sl, ExitReason::StopLoss, None);
                if let Some(trade) = result.trade {
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
                let result = self.close_position(agent_id, &position.symbol, tp, ExitReason::TakeProfit, None);
                if let Some(trade) = result.trade {
                    closed.push(trade);
                }
            }
        }

        closed
    }

    /// Read-only: recomputes realized PnL from closed trades and expected
    /// equity from cash plus open positions, comparing each against the
    /// bookkept portfolio row — the two invariants from §8 properties #1
    /// and #2, both reported rather than just a pass/fail boolean.
    #[instrument(skip(self))]
    pub fn reconcile(&self, agent_id: &str) -> Option<ReconcileReport> {
        let portfolio = self.store.get_portfolio(agent_id)?;

        let expected_realized_pnl: f64 = self.store.trades_for_agent(agent_id).iter().map(|t| t.realized_pnl).sum();
        let pnl_discrepancy = (expected_realized_pnl - portfolio.total_realized_pnl).abs();

        let expected_equity: f64 = portfolio.cash_balance
            + self.store.positions_for_agent(agent_id).iter().map(|p| p.size + p.unrealized_pnl).sum::<f64>();
        let actual_equity = portfolio.total_equity;
        let equity_discrepancy = (expected_equity - actual_equity).abs();

        let within_tolerance = pnl_discrepancy <= RECONCILE_TOLERANCE && equity_discrepancy <= RECONCILE_TOLERANCE;

        if !within_tolerance {
            let discrepancy = pnl_discrepancy.max(equity_discrepancy);
            let err = EngineError::PortfolioInvariant { discrepancy };
            warn!(agent_id, pnl_discrepancy, equity_discrepancy, error = %err, "portfolio reconciliation discrepancy exceeds tolerance");
        }

        Some(ReconcileReport {
            expected_realized_pnl,
            actual_realized_pnl: portfolio.total_realized_pnl,
            pnl_discrepancy,
            expected_equity,
            actual_equity,
            equity_discrepancy,
            within_tolerance,
        })
    }

    /// Closes every open position for `agent_id`, used when an agent pauses.
    #[instrument(skip(self, current_prices))]
    pub fn close_all_positions(
        &self,
        agent_id: &str,
        current_prices: &HashMap<String, f64>,
        reason: ExitReason,
    ) -> Vec<AgentTrade> {
        let mut closed = Vec::new();
        for position in self.store.positions_for_agent(agent_id) {
            let Some(&price) = current_prices.get(&position.symbol) else {
                warn!(agent_id, symbol = %position.symbol, "no price available to force-close position");
                continue;
            };
            let result = self.close_position(agent_id, &position.symbol, price, reason, None);
            if let Some(trade) = result.trade {
                closed.push(trade);
            }
        }
        closed
    }
}

/// Construct a fresh portfolio row for a newly created agent.
pub fn new_portfolio(agent_id: &str, initial_balance: f64) -> AgentPortfolio {
    let now = Utc::now().timestamp_millis();
    AgentPortfolio {
        agent_id: agent_id.to_string(),
        cash_balance: initial_balance,
        total_equity: initial_balance,
        total_realized_pnl: 0.0,
        total_fees_paid: 0.0,
        peak_equity: initial_balance,
        trough_equity: initial_balance,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::TracingNotifier;

    fn manager() -> (PortfolioManager, Arc<Store>) {
        let store = Arc::new(Store::new());
        let manager = PortfolioManager::new(store.clone(), Arc::new(TracingNotifier));
        (manager, store)
    }

    fn open_action(symbol: &str, size_pct: f64, confidence: f64) -> TradeAction {
        TradeAction {
            action: ActionKind::OpenLong,
            symbol: Some(symbol.to_string()),
            size_pct,
            sl_pct: 0.04,
            tp_pct: 0.06,
            confidence,
            reasoning: "test".into(),
        }
    }

    #[test]
    fn validate_rejects_oversized_position() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.5, 0.8);
        let prices = HashMap::from([("BTCUSDT".to_string(), 100.0)]);
        let result = manager.validate("a1", &action, &prices);
        assert!(!result.valid);
    }

    #[test]
    fn validate_warns_on_low_confidence() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.3);
        let prices = HashMap::from([("BTCUSDT".to_string(), 100.0)]);
        let result = manager.validate("a1", &action, &prices);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn open_then_close_position_round_trips_cash() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.9);
        let open_result = manager.open_position("a1", &action, 100.0);
        assert!(open_result.success);

        let close_result = manager.close_position("a1", "BTCUSDT", 110.0, ExitReason::AgentDecision, Some("d1"));
        assert!(close_result.success);
        let trade = close_result.trade.unwrap();
        assert!(trade.realized_pnl > 0.0);
        assert!(store.positions_for_agent("a1").is_empty());
    }

    #[test]
    fn cannot_open_second_position_in_same_symbol() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.9);
        manager.open_position("a1", &action, 100.0);
        let result = manager.validate("a1", &action, &HashMap::from([("BTCUSDT".to_string(), 100.0)]));
        assert!(!result.valid);
    }

    #[test]
    fn sl_before_tp_closes_first_hit_only() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.9);
        manager.open_position("a1", &action, 100.0);

        let candle = Candle::new(0, 100.0, 107.0, 95.0, 96.0, 1.0, 0, 1.0, 1);
        let trades = manager.check_stop_loss_take_profit("a1", &HashMap::from([("BTCUSDT".to_string(), candle)]));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn reconcile_matches_after_clean_round_trip() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.9);
        manager.open_position("a1", &action, 100.0);
        manager.close_position("a1", "BTCUSDT", 105.0, ExitReason::AgentDecision, None);

        let report = manager.reconcile("a1").unwrap();
        assert!(report.within_tolerance);
        assert!(report.pnl_discrepancy < 1e-9);
        assert!(report.equity_discrepancy < 1e-9);
    }

    #[test]
    fn reconcile_flags_equity_discrepancy_from_tampered_portfolio() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        manager.open_position("a1", &open_action("BTCUSDT", 0.1, 0.9), 100.0);

        let mut portfolio = store.get_portfolio("a1").unwrap();
        portfolio.total_equity += 50.0;
        store.upsert_portfolio(portfolio);

        let report = manager.reconcile("a1").unwrap();
        assert!(!report.within_tolerance);
        assert!(report.equity_discrepancy >= 50.0 - 1e-9);
    }

    #[test]
    fn update_unrealized_pnl_tracks_peak_equity() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        let action = open_action("BTCUSDT", 0.1, 0.9);
        manager.open_position("a1", &action, 100.0);
        manager.update_unrealized_pnl("a1", &HashMap::from([("BTCUSDT".to_string(), 150.0)]));

        let portfolio = store.get_portfolio("a1").unwrap();
        assert!(portfolio.peak_equity >= portfolio.total_equity);
        assert!(portfolio.total_equity > 1000.0);
    }

    #[test]
    fn close_all_positions_force_closes_with_reason() {
        let (manager, store) = manager();
        store.upsert_portfolio(new_portfolio("a1", 1000.0));
        manager.open_position("a1", &open_action("BTCUSDT", 0.1, 0.9), 100.0);
        manager.open_position("a1", &open_action("ETHUSDT", 0.1, 0.9), 50.0);

        let prices = HashMap::from([("BTCUSDT".to_string(), 100.0), ("ETHUSDT".to_string(), 50.0)]);
        let closed = manager.close_all_positions("a1", &prices, ExitReason::AgentPaused);
        assert_eq!(closed.len(), 2);
        assert!(store.positions_for_agent("a1").is_empty());
    }
}
