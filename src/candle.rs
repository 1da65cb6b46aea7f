// =============================================================================
// Canonical OHLCV candle
// =============================================================================
//
// One shape used by every component: the exchange client, the indicator
// registry, the pipeline runner, and the backtest engine all pass `Candle`
// values around rather than each defining their own subset of fields.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
    pub trades_count: u64,
}

impl Candle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
        quote_volume: f64,
        trades_count: u64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
            quote_volume,
            trades_count,
        }
    }
}

/// Extract the closing prices from a candle slice, in order.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Extract the high prices from a candle slice, in order.
pub fn highs(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.high).collect()
}

/// Extract the low prices from a candle slice, in order.
pub fn lows(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.low).collect()
}

/// Extract the volumes from a candle slice, in order.
pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64) -> Candle {
        Candle::new(0, close, close, close, close, 1.0, 0, 1.0, 1)
    }

    #[test]
    fn closes_extracts_in_order() {
        let candles = vec![candle(1.0), candle(2.0), candle(3.0)];
        assert_eq!(closes(&candles), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_slice_yields_empty_vecs() {
        assert!(closes(&[]).is_empty());
        assert!(highs(&[]).is_empty());
    }
}
