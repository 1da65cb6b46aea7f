// =============================================================================
// Position math — pure functions shared by the live and backtest portfolios
// =============================================================================

use crate::types::Direction;

/// Trading fee charged per leg (entry, exit), as a fraction of notional.
pub const FEE_PER_LEG: f64 = 0.001;
/// Maximum position size as a fraction of equity at open time.
pub const MAX_POSITION_SIZE_PCT: f64 = 0.25;
/// Maximum concurrent open positions per agent, absent an archetype override.
pub const MAX_CONCURRENT_POSITIONS: usize = 5;
/// Reconciliation discrepancy tolerance in quote currency.
pub const RECONCILE_TOLERANCE: f64 = 0.01;

/// Quote-currency notional for a position sized at `size_pct` of `equity`.
pub fn notional(equity: f64, size_pct: f64) -> f64 {
    equity * size_pct
}

/// Fee charged on one leg of `notional`.
pub fn fee(notional: f64) -> f64 {
    notional * FEE_PER_LEG
}

/// Unrealized or realized PnL for a position of `notional` opened at
/// `entry_price`, marked at `current_price`.
pub fn pnl(direction: Direction, entry_price: f64, current_price: f64, notional: f64) -> f64 {
    let price_return = match direction {
        Direction::Long => (current_price - entry_price) / entry_price,
        Direction::Short => (entry_price - current_price) / entry_price,
    };
    price_return * notional
}

/// Stop-loss and take-profit prices derived from percentage distances.
/// Long: SL below entry, TP above. Short: inverse.
pub fn derive_sl_tp(direction: Direction, entry_price: f64, sl_pct: f64, tp_pct: f64) -> (f64, f64) {
    match direction {
        Direction::Long => (entry_price * (1.0 - sl_pct), entry_price * (1.0 + tp_pct)),
        Direction::Short => (entry_price * (1.0 + sl_pct), entry_price * (1.0 - tp_pct)),
    }
}

/// Whole minutes between open and close, floored at 1.
pub fn duration_minutes(opened_at_ms: i64, closed_at_ms: i64) -> i64 {
    ((closed_at_ms - opened_at_ms) / 60_000).max(1)
}

/// `true` if a long position's stop-loss is hit by this candle's low.
pub fn long_sl_hit(stop_loss: f64, low: f64) -> bool {
    low <= stop_loss
}

/// `true` if a short position's stop-loss is hit by this candle's high.
pub fn short_sl_hit(stop_loss: f64, high: f64) -> bool {
    high >= stop_loss
}

/// `true` if a long position's take-profit is hit by this candle's high.
pub fn long_tp_hit(take_profit: f64, high: f64) -> bool {
    high >= take_profit
}

/// `true` if a short position's take-profit is hit by this candle's low.
pub fn short_tp_hit(take_profit: f64, low: f64) -> bool {
    low <= take_profit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notional_scales_with_size_pct() {
        assert_eq!(notional(1000.0, 0.15), 150.0);
    }

    #[test]
    fn fee_is_ten_bps() {
        assert_eq!(fee(1000.0), 1.0);
    }

    #[test]
    fn long_pnl_positive_on_price_increase() {
        let p = pnl(Direction::Long, 100.0, 110.0, 1000.0);
        assert!((p - 100.0).abs() < 1e-9);
    }

    #[test]
    fn short_pnl_positive_on_price_decrease() {
        let p = pnl(Direction::Short, 100.0, 90.0, 1000.0);
        assert!((p - 100.0).abs() < 1e-9);
    }

    #[test]
    fn derive_sl_tp_long_brackets_entry() {
        let (sl, tp) = derive_sl_tp(Direction::Long, 100.0, 0.04, 0.06);
        assert!((sl - 96.0).abs() < 1e-9);
        assert!((tp - 106.0).abs() < 1e-9);
    }

    #[test]
    fn derive_sl_tp_short_inverts_brackets() {
        let (sl, tp) = derive_sl_tp(Direction::Short, 100.0, 0.04, 0.06);
        assert!((sl - 104.0).abs() < 1e-9);
        assert!((tp - 94.0).abs() < 1e-9);
    }

    #[test]
    fn duration_minutes_floors_at_one() {
        assert_eq!(duration_minutes(0, 30_000), 1);
        assert_eq!(duration_minutes(0, 120_000), 2);
    }

    #[test]
    fn sl_tp_hit_detection_respects_direction() {
        assert!(long_sl_hit(95.0, 94.0));
        assert!(!long_sl_hit(95.0, 96.0));
        assert!(short_sl_hit(105.0, 106.0));
        assert!(long_tp_hit(110.0, 111.0));
        assert!(short_tp_hit(90.0, 89.0));
    }
}
