// =============================================================================
// Single-timeframe technical archetypes: momentum, mean reversion, breakout,
// swing.
// =============================================================================
//
// Each strategy is two passes over `primary_timeframe_rankings`: first check
// whether any open position should close, then — only if nothing closed —
// scan for a fresh entry. A strategy never opens and closes in the same
// cycle; the exit check always wins.
// =============================================================================

use crate::ranker::RankedSnapshot;
use crate::types::{ActionKind, TradeAction};

use super::{AgentContext, Strategy};

fn confidence_pct(r: &RankedSnapshot) -> f64 {
    r.confidence_score * 100.0
}

pub struct MomentumStrategy;

impl MomentumStrategy {
    fn check_exits(&self, context: &AgentContext) -> Option<TradeAction> {
        for pos in &context.portfolio.positions {
            let Some(r) = context.ranking_for(&pos.symbol) else { continue };
            let (Some(rsi), Some(pve20)) = (self.raw(r, "rsi_14", "rsi"), self.raw(r, "ema_20", "pct")) else {
                continue;
            };

            let exit = match pos.direction {
                crate::types::Direction::Long => rsi > 75.0 || pve20 < 0.0,
                crate::types::Direction::Short => rsi < 25.0 || pve20 > 0.0,
            };
            if exit {
                return Some(TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    size_pct: 0.0,
                    sl_pct: 0.0,
                    tp_pct: 0.0,
                    confidence: 0.8,
                    reasoning: String::new(),
                });
            }
        }
        None
    }
}

impl Strategy for MomentumStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        if let Some(close) = self.check_exits(context) {
            return close;
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let (Some(rsi), Some(macd_hist), Some(adx), Some(plus_di), Some(minus_di), Some(obv_slope), Some(pve50), Some(pve200)) = (
                self.raw(r, "rsi_14", "rsi"),
                self.raw(r, "macd_12_26_9", "histogram"),
                self.raw(r, "adx_14", "adx"),
                self.raw(r, "adx_14", "plus_di"),
                self.raw(r, "adx_14", "minus_di"),
                self.raw(r, "obv", "slope_normalized"),
                self.raw(r, "ema_50", "pct"),
                self.raw(r, "ema_200", "pct"),
            ) else {
                continue;
            };

            if r.bullish_score >= 0.70
                && confidence_pct(r) >= 60.0
                && (50.0..=70.0).contains(&rsi)
                && macd_hist > 0.0
                && adx > 25.0
                && plus_di > minus_di
                && pve50 > 0.0
                && pve200 > 0.0
                && obv_slope > 0.0
            {
                let size = if confidence_pct(r) >= 75.0 { 0.15 } else { 0.08 };
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: size,
                    sl_pct: 0.04,
                    tp_pct: 0.06,
                    confidence: r.bullish_score,
                    reasoning: String::new(),
                };
            }

            if r.bullish_score <= 0.30
                && confidence_pct(r) >= 60.0
                && (30.0..=50.0).contains(&rsi)
                && macd_hist < 0.0
                && adx > 25.0
                && minus_di > plus_di
                && pve50 < 0.0
                && pve200 < 0.0
                && obv_slope < 0.0
            {
                let size = if confidence_pct(r) >= 75.0 { 0.15 } else { 0.08 };
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(r.symbol.clone()),
                    size_pct: size,
                    sl_pct: 0.04,
                    tp_pct: 0.06,
                    confidence: 1.0 - r.bullish_score,
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Momentum: no entry/exit conditions met. Holding.".to_string(),
            ActionKind::Close => format!(
                "Momentum: closing {} — exit signal triggered (RSI extreme or EMA20 cross).",
                action.symbol.as_deref().unwrap_or("position")
            ),
            ActionKind::OpenLong | ActionKind::OpenShort => {
                let direction = if action.action == ActionKind::OpenLong { "LONG" } else { "SHORT" };
                format!(
                    "Momentum: opening {direction} {} — score conditions met, size={:.2}, SL={:.2}, TP={:.2}, confidence={:.2}.",
                    action.symbol.as_deref().unwrap_or(""),
                    action.size_pct,
                    action.sl_pct,
                    action.tp_pct,
                    action.confidence
                )
            }
        }
    }
}

pub struct MeanReversionStrategy;

impl MeanReversionStrategy {
    fn check_exits(&self, context: &AgentContext) -> Option<TradeAction> {
        for pos in &context.portfolio.positions {
            let Some(r) = context.ranking_for(&pos.symbol) else { continue };
            let (Some(pve20), Some(rsi)) = (self.raw(r, "ema_20", "pct"), self.raw(r, "rsi_14", "rsi")) else {
                continue;
            };

            let exit = match pos.direction {
                crate::types::Direction::Long => pve20.abs() < 0.3 || (50.0..=60.0).contains(&rsi),
                crate::types::Direction::Short => pve20.abs() < 0.3 || (40.0..=50.0).contains(&rsi),
            };
            if exit {
                return Some(TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.7,
                    ..TradeAction::hold(String::new())
                });
            }
        }
        None
    }
}

impl Strategy for MeanReversionStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        if let Some(close) = self.check_exits(context) {
            return close;
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let (Some(pve200), Some(rsi), Some(percent_b), Some(k), Some(d)) = (
                self.raw(r, "ema_200", "pct"),
                self.raw(r, "rsi_14", "rsi"),
                self.raw(r, "bbands_20_2", "percent_b"),
                self.raw(r, "stoch_14_3_3", "k"),
                self.raw(r, "stoch_14_3_3", "d"),
            ) else {
                continue;
            };

            if pve200 > 0.0
                && (rsi < 30.0 || percent_b < 0.05)
                && k < 20.0
                && k > d
                && (0.20..=0.45).contains(&r.bullish_score)
            {
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.03,
                    tp_pct: 0.04,
                    confidence: r.bullish_score,
                    reasoning: String::new(),
                };
            }

            if pve200 < 0.0
                && (rsi > 70.0 || percent_b > 0.95)
                && k > 80.0
                && k < d
                && (0.55..=0.80).contains(&r.bullish_score)
            {
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.03,
                    tp_pct: 0.04,
                    confidence: 1.0 - r.bullish_score,
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Mean reversion: no extreme found. Holding.".to_string(),
            ActionKind::Close => format!(
                "Mean reversion: closing {} — price normalized back toward EMA20/RSI midpoint.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Mean reversion: fading extreme on {} — size={:.2}, confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.size_pct,
                action.confidence
            ),
        }
    }
}

pub struct BreakoutStrategy;

const BREAKOUT_MAX_OPEN: usize = 2;

impl BreakoutStrategy {
    fn check_exits(&self, context: &AgentContext) -> Option<TradeAction> {
        for pos in &context.portfolio.positions {
            let Some(r) = context.ranking_for(&pos.symbol) else { continue };
            let Some(percent_b) = self.raw(r, "bbands_20_2", "percent_b") else { continue };
            if (0.0..=1.0).contains(&percent_b) {
                return Some(TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.7,
                    ..TradeAction::hold(String::new())
                });
            }
        }
        None
    }
}

impl Strategy for BreakoutStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        if let Some(close) = self.check_exits(context) {
            return close;
        }
        if context.portfolio.positions.len() >= BREAKOUT_MAX_OPEN {
            return self.hold(0.1);
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let (Some(bandwidth), Some(percent_b), Some(obv_slope), Some(adx)) = (
                self.raw(r, "bbands_20_2", "bandwidth"),
                self.raw(r, "bbands_20_2", "percent_b"),
                self.raw(r, "obv", "slope_normalized"),
                self.raw(r, "adx_14", "adx"),
            ) else {
                continue;
            };
            if bandwidth >= 5.0 {
                continue;
            }

            if percent_b > 1.0 && obv_slope > 2.0 && adx < 25.0 && (0.55..=0.75).contains(&r.bullish_score) {
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.08,
                    sl_pct: 0.05,
                    tp_pct: 0.10,
                    confidence: r.bullish_score,
                    reasoning: String::new(),
                };
            }

            if percent_b < 0.0 && obv_slope < -2.0 && adx < 25.0 && (0.25..=0.45).contains(&r.bullish_score) {
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.08,
                    sl_pct: 0.05,
                    tp_pct: 0.10,
                    confidence: 1.0 - r.bullish_score,
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Breakout: no squeeze expansion found. Holding.".to_string(),
            ActionKind::Close => format!(
                "Breakout: closing {} — %B returned inside the bands, move exhausted.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Breakout: squeeze expansion on {} — size={:.2}, confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.size_pct,
                action.confidence
            ),
        }
    }
}

pub struct SwingStrategy;

const SWING_MAX_OPEN: usize = 3;

impl SwingStrategy {
    fn check_exits(&self, context: &AgentContext) -> Option<TradeAction> {
        for pos in &context.portfolio.positions {
            let Some(r) = context.ranking_for(&pos.symbol) else { continue };
            let (Some(rsi), Some(pve200)) = (self.raw(r, "rsi_14", "rsi"), self.raw(r, "ema_200", "pct")) else {
                continue;
            };

            let exit = match pos.direction {
                crate::types::Direction::Long => rsi >= 70.0 || pve200 < 0.0,
                crate::types::Direction::Short => rsi <= 30.0 || pve200 > 0.0,
            };
            if exit {
                return Some(TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.75,
                    ..TradeAction::hold(String::new())
                });
            }
        }
        None
    }
}

impl Strategy for SwingStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        if let Some(close) = self.check_exits(context) {
            return close;
        }
        if context.portfolio.positions.len() >= SWING_MAX_OPEN {
            return self.hold(0.1);
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let (Some(adx), Some(pve50), Some(pve200), Some(rsi), Some(k), Some(d)) = (
                self.raw(r, "adx_14", "adx"),
                self.raw(r, "ema_50", "pct"),
                self.raw(r, "ema_200", "pct"),
                self.raw(r, "rsi_14", "rsi"),
                self.raw(r, "stoch_14_3_3", "k"),
                self.raw(r, "stoch_14_3_3", "d"),
            ) else {
                continue;
            };
            if adx < 20.0 {
                continue;
            }

            if pve50 > pve200
                && pve50 > 0.0
                && pve200 > 0.0
                && r.bullish_score >= 0.55
                && confidence_pct(r) >= 65.0
                && (40.0..=55.0).contains(&rsi)
                && k < 50.0
                && k > d
            {
                let size = if confidence_pct(r) >= 70.0 { 0.20 } else { 0.12 };
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: size,
                    sl_pct: 0.04,
                    tp_pct: 0.08,
                    confidence: r.bullish_score,
                    reasoning: String::new(),
                };
            }

            if pve50 < pve200
                && pve50 < 0.0
                && pve200 < 0.0
                && r.bullish_score <= 0.45
                && confidence_pct(r) >= 65.0
                && (45.0..=60.0).contains(&rsi)
                && k > 50.0
                && k < d
            {
                let size = if confidence_pct(r) >= 70.0 { 0.20 } else { 0.12 };
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(r.symbol.clone()),
                    size_pct: size,
                    sl_pct: 0.04,
                    tp_pct: 0.08,
                    confidence: 1.0 - r.bullish_score,
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Swing: no trend alignment across EMA50/EMA200 found. Holding.".to_string(),
            ActionKind::Close => format!(
                "Swing: closing {} — RSI extreme or trend broke EMA200.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Swing: trend-aligned entry on {} — size={:.2}, confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.size_pct,
                action.confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;
    use crate::ranker::{rank_single, ScoredSymbol};
    use crate::store::AgentPosition;
    use crate::strategy::test_support::empty_context;
    use crate::types::Direction;
    use chrono::Utc;

    fn trending_symbol(name: &str, start: f64, step: f64, n: usize) -> ScoredSymbol {
        let candles: Vec<Candle> = (0..n)
            .map(|i| {
                let close = start + i as f64 * step;
                Candle::new(i as i64, close, close + 0.5, close - 0.5, close, 1_000.0 + i as f64, i as i64, close * 1_000.0, 10)
            })
            .collect();
        ScoredSymbol { symbol: name.to_string(), candles, quote_volume_24h: 5_000_000.0, funding_rate: None }
    }

    #[test]
    fn momentum_holds_with_no_rankings() {
        let ctx = empty_context(vec![]);
        let action = MomentumStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }

    #[test]
    fn momentum_respects_position_cap() {
        let sym = trending_symbol("AAAUSDT", 100.0, 1.0, 220);
        let snapshot = rank_single(&sym, "1h", "run-1", 0);
        let mut ctx = empty_context(vec![snapshot]);
        ctx.portfolio.positions = (0..5)
            .map(|i| AgentPosition {
                id: format!("p{i}"),
                agent_id: "agent-1".to_string(),
                symbol: format!("SYM{i}USDT"),
                direction: Direction::Long,
                entry_price: 100.0,
                size: 100.0,
                stop_loss: Some(90.0),
                take_profit: Some(120.0),
                opened_at: Utc::now().timestamp_millis(),
                unrealized_pnl: 0.0,
            })
            .collect();
        let action = MomentumStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
        assert!((action.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn swing_caps_concurrent_positions_at_three() {
        let sym = trending_symbol("AAAUSDT", 100.0, 1.0, 220);
        let snapshot = rank_single(&sym, "1h", "run-1", 0);
        let mut ctx = empty_context(vec![snapshot]);
        ctx.portfolio.positions = (0..3)
            .map(|i| AgentPosition {
                id: format!("p{i}"),
                agent_id: "agent-1".to_string(),
                symbol: format!("SYM{i}USDT"),
                direction: Direction::Long,
                entry_price: 100.0,
                size: 100.0,
                stop_loss: Some(90.0),
                take_profit: Some(120.0),
                opened_at: Utc::now().timestamp_millis(),
                unrealized_pnl: 0.0,
            })
            .collect();
        let action = SwingStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }

    #[test]
    fn breakout_skips_symbols_outside_squeeze() {
        let sym = trending_symbol("AAAUSDT", 100.0, 1.0, 220);
        let snapshot = rank_single(&sym, "1h", "run-1", 0);
        let ctx = empty_context(vec![snapshot]);
        let action = BreakoutStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }

    #[test]
    fn momentum_reasoning_mentions_symbol_on_open() {
        let action = TradeAction {
            action: ActionKind::OpenLong,
            symbol: Some("BTCUSDT".to_string()),
            size_pct: 0.15,
            sl_pct: 0.04,
            tp_pct: 0.06,
            confidence: 0.8,
            reasoning: String::new(),
        };
        let ctx = empty_context(vec![]);
        let reasoning = MomentumStrategy.generate_reasoning(&ctx, &action);
        assert!(reasoning.contains("BTCUSDT"));
        assert!(reasoning.contains("LONG"));
    }
}
