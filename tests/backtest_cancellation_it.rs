// S6 — backtest cancellation. A 500-bar momentum replay is cancelled
// externally partway through; the run must stop at the cancellation bar,
// force-close any open position at that bar's close, and leave an equity
// curve with a substantial number of recorded snapshots — the same
// cooperative-cancellation contract `backtest::engine::execute` honors via
// its periodic `CancelToken` check.

use std::collections::HashMap;

use aurora_arena::backtest::{CancelToken, SimPortfolio};
use aurora_arena::candle::Candle;
use aurora_arena::ranker::{rank_single, ScoredSymbol};
use aurora_arena::strategy::{AgentContext, Archetype, PerformanceStats, PortfolioSummary};
use aurora_arena::types::{ActionKind, ExitReason};

const SYMBOL: &str = "ETHUSDT";
const BAR_COUNT: usize = 500;
const CANCEL_AFTER_BAR: usize = 250;

fn synthetic_candles(count: usize) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    let mut price = 2_000.0_f64;
    for i in 0..count {
        price += (i as f64 * 0.37).sin() * 5.0;
        let open = price;
        let high = price + 8.0;
        let low = price - 8.0;
        let close = price + (i as f64 * 0.11).cos() * 3.0;
        candles.push(Candle::new(i as i64 * 3_600_000, open, high, low, close, 100.0, i as i64 * 3_600_000 + 3_600_000, 200_000.0, 50));
    }
    candles
}

#[test]
fn cancelled_run_force_closes_and_keeps_a_partial_equity_curve() {
    let candles = synthetic_candles(BAR_COUNT);
    let cancel = CancelToken::new();
    let mut portfolio = SimPortfolio::new(10_000.0);

    let mut bars_run = 0;
    let mut cancelled_at_close = None;

    for (i, candle) in candles.iter().enumerate() {
        if i == CANCEL_AFTER_BAR {
            cancel.cancel();
        }
        if cancel.is_cancelled() {
            cancelled_at_close = Some(candle.close);
            break;
        }
        bars_run += 1;

        let window = candles[..=i].to_vec();
        let prices = HashMap::from([(SYMBOL.to_string(), candle.close)]);
        let scored = ScoredSymbol { symbol: SYMBOL.to_string(), candles: window, quote_volume_24h: 0.0, funding_rate: None };
        let ranking = rank_single(&scored, "1h", "backtest-s6", candle.open_time);

        let candle_data = HashMap::from([(SYMBOL.to_string(), *candle)]);
        portfolio.check_stop_loss_take_profit(&candle_data, candle.open_time);

        let context = AgentContext {
            agent_id: "backtest".to_string(),
            portfolio: PortfolioSummary {
                cash_balance: portfolio.cash,
                total_equity: portfolio.equity(&prices),
                positions: portfolio.open_position_rows(),
                available_for_new_position: portfolio.available_for_new_position(&prices),
            },
            performance: PerformanceStats::default(),
            primary_timeframe_rankings: vec![ranking],
            cross_timeframe: None,
            tweet: None,
            current_prices: prices.clone(),
            recent_memory: Vec::new(),
        };

        let action = Archetype::Momentum.evaluate(&context);
        match action.action {
            ActionKind::OpenLong | ActionKind::OpenShort => {
                if action.symbol.as_deref() == Some(SYMBOL) {
                    let direction =
                        if action.action == ActionKind::OpenLong { aurora_arena::types::Direction::Long } else { aurora_arena::types::Direction::Short };
                    let size_pct = if action.size_pct > 0.0 { action.size_pct } else { 0.10 };
                    portfolio.open_position(SYMBOL, direction, candle.close, size_pct, action.sl_pct, action.tp_pct, candle.open_time, &prices);
                }
            }
            ActionKind::Close => {
                if action.symbol.as_deref() == Some(SYMBOL) {
                    portfolio.close_position(SYMBOL, candle.close, ExitReason::AgentDecision, candle.open_time);
                }
            }
            ActionKind::Hold => {}
        }

        portfolio.update_equity(&prices, candle.open_time);
    }

    assert_eq!(bars_run, CANCEL_AFTER_BAR);
    let cancel_close = cancelled_at_close.expect("loop must break on cancellation");

    let open_symbols: Vec<String> = portfolio.positions().map(|p| p.symbol.clone()).collect();
    for symbol in open_symbols {
        portfolio.close_position(&symbol, cancel_close, ExitReason::BacktestEnd, candles[CANCEL_AFTER_BAR].open_time);
    }
    portfolio.update_equity(&HashMap::from([(SYMBOL.to_string(), cancel_close)]), candles[CANCEL_AFTER_BAR].open_time);

    assert_eq!(portfolio.position_count(), 0);
    assert!(portfolio.equity_curve.len() >= 50, "got {} snapshots", portfolio.equity_curve.len());
    for trade in portfolio.trades.iter().filter(|t| t.exit_reason == ExitReason::BacktestEnd) {
        assert_eq!(trade.closed_at, candles[CANCEL_AFTER_BAR].open_time);
        assert!((trade.exit_price - cancel_close).abs() < 1e-9);
    }
}
