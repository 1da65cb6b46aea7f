// S1 — mean-reversion long, take-profit hit.
//
// $10,000 agent opens a 10% long on a TP/SL bracket, the next bar's high
// clears the take-profit before the low touches the stop-loss, and the
// position closes there. Exercises `PortfolioManager::open_position`,
// `check_stop_loss_take_profit`, and `update_unrealized_pnl` together —
// the same sequence the orchestrator runs once per cycle.

use std::collections::HashMap;
use std::sync::Arc;

use aurora_arena::candle::Candle;
use aurora_arena::notifier::TracingNotifier;
use aurora_arena::portfolio::{new_portfolio, PortfolioManager};
use aurora_arena::store::Store;
use aurora_arena::types::{ActionKind, TradeAction};

#[test]
fn mean_reversion_long_closes_at_take_profit() {
    let store = Arc::new(Store::new());
    let manager = PortfolioManager::new(store.clone(), Arc::new(TracingNotifier));

    store.upsert_portfolio(new_portfolio("agent-1", 10_000.0));

    let entry_action = TradeAction {
        action: ActionKind::OpenLong,
        symbol: Some("BTCUSDT".to_string()),
        size_pct: 0.10,
        sl_pct: 0.03,
        tp_pct: 0.04,
        confidence: 0.62,
        reasoning: "mean reversion: oversold bounce".to_string(),
    };

    let open_result = manager.open_position("agent-1", &entry_action, 50.00);
    assert!(open_result.success);

    let portfolio_after_open = store.get_portfolio("agent-1").unwrap();
    assert!((portfolio_after_open.cash_balance - 8_999.0).abs() < 1e-9, "got {}", portfolio_after_open.cash_balance);

    let position = store.positions_for_agent("agent-1").remove(0);
    assert!((position.stop_loss.unwrap() - 48.50).abs() < 1e-9);
    assert!((position.take_profit.unwrap() - 52.00).abs() < 1e-9);

    // Bar T+1: high clears TP before low touches SL.
    let next_bar = Candle::new(1, 51.00, 52.30, 49.80, 51.80, 10.0, 2, 500.0, 5);
    let candle_data = HashMap::from([("BTCUSDT".to_string(), next_bar)]);
    let closed = manager.check_stop_loss_take_profit("agent-1", &candle_data);
    assert_eq!(closed.len(), 1);
    assert!((closed[0].realized_pnl - 39.0).abs() < 1e-9, "got {}", closed[0].realized_pnl);

    manager.update_unrealized_pnl("agent-1", &HashMap::new());

    let portfolio = store.get_portfolio("agent-1").unwrap();
    assert!((portfolio.cash_balance - 10_038.0).abs() < 1e-9, "got {}", portfolio.cash_balance);
    assert!((portfolio.total_equity - 10_038.0).abs() < 1e-9, "got {}", portfolio.total_equity);

    let report = manager.reconcile("agent-1").unwrap();
    assert!(report.within_tolerance);
}
