// =============================================================================
// Cross-timeframe archetypes: confluence, divergence, cascade, regime.
// =============================================================================
//
// These read `context.cross_timeframe` instead of scanning a single
// timeframe's rankings for thresholds — they degrade to hold whenever the
// bundle is absent, since there is nothing to confluence against.
// =============================================================================

use crate::types::{ActionKind, Timeframe, TradeAction};

use super::{AgentContext, RegimeTag, Strategy};

pub struct ConfluenceStrategy;

const CONFLUENCE_MAX_OPEN: usize = 3;

impl Strategy for ConfluenceStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(cross) = &context.cross_timeframe else { return self.hold(0.0) };
        if context.portfolio.positions.len() >= CONFLUENCE_MAX_OPEN || !self.can_open_with_cap(context, CONFLUENCE_MAX_OPEN) {
            return self.hold(0.1);
        }

        for symbol in &cross.bullish_confluence {
            if self.has_position(context, symbol) {
                continue;
            }
            if matches!(cross.higher_tf_regime, Some(RegimeTag::Bear)) {
                continue;
            }

            let alignment = match cross.higher_tf_regime {
                Some(RegimeTag::Bull) => 1.5,
                Some(RegimeTag::Mixed) => 0.7,
                _ => 1.0,
            };
            let size = (0.18 * alignment).min(0.25);

            return TradeAction {
                action: ActionKind::OpenLong,
                symbol: Some(symbol.clone()),
                size_pct: size,
                sl_pct: 0.06,
                tp_pct: 0.12,
                confidence: cross.avg_score(symbol, &Timeframe::ALL).unwrap_or(0.6),
                reasoning: String::new(),
            };
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Confluence: no symbol in bullish confluence set. Holding.".to_string(),
            _ => format!(
                "Confluence: {} agrees across timeframes — size={:.2}, confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.size_pct,
                action.confidence
            ),
        }
    }
}

pub struct DivergenceStrategy;

const LONG_TERM: [Timeframe; 2] = [Timeframe::D1, Timeframe::W1];
const SHORT_TERM: [Timeframe; 2] = [Timeframe::M15, Timeframe::H1];

impl Strategy for DivergenceStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(cross) = &context.cross_timeframe else { return self.hold(0.0) };

        for pos in &context.portfolio.positions {
            let Some(long_term) = cross.avg_score(&pos.symbol, &LONG_TERM) else { continue };
            let Some(short_term) = cross.avg_score(&pos.symbol, &SHORT_TERM) else { continue };
            let aligned = match pos.direction {
                crate::types::Direction::Long => short_term >= 0.55 || long_term <= 0.45,
                crate::types::Direction::Short => short_term <= 0.45 || long_term >= 0.55,
            };
            if aligned {
                return TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.7,
                    ..TradeAction::hold(String::new())
                };
            }
        }

        if !self.can_open(context) {
            return self.hold(0.1);
        }
        if matches!(cross.higher_tf_regime, Some(RegimeTag::Mixed)) && cross.higher_tf_confidence >= 60 {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let Some(long_term) = cross.avg_score(&r.symbol, &LONG_TERM) else { continue };
            let Some(short_term) = cross.avg_score(&r.symbol, &SHORT_TERM) else { continue };

            if long_term >= 0.60 && short_term <= 0.35 {
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.05,
                    tp_pct: 0.08,
                    confidence: long_term,
                    reasoning: String::new(),
                };
            }
            if long_term <= 0.40 && short_term >= 0.65 {
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.05,
                    tp_pct: 0.08,
                    confidence: 1.0 - long_term,
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Divergence: short-term and long-term timeframes agree. Holding.".to_string(),
            ActionKind::Close => format!(
                "Divergence: closing {} — short-term realigned with long-term.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Divergence: {} diverges from its own long-term trend — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

pub struct CascadeStrategy;

const CASCADE_MAX_OPEN: usize = 3;

impl Strategy for CascadeStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(cross) = &context.cross_timeframe else { return self.hold(0.0) };

        for pos in &context.portfolio.positions {
            let Some(weekly) = cross.avg_score(&pos.symbol, &[Timeframe::W1]) else { continue };
            let Some(hourly) = cross.avg_score(&pos.symbol, &[Timeframe::H1]) else { continue };
            let revert_or_complete = match pos.direction {
                crate::types::Direction::Long => weekly < 0.50 || hourly >= 0.60,
                crate::types::Direction::Short => weekly > 0.50 || hourly <= 0.40,
            };
            if revert_or_complete {
                return TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.7,
                    ..TradeAction::hold(String::new())
                };
            }
        }

        if context.portfolio.positions.len() >= CASCADE_MAX_OPEN || !self.can_open_with_cap(context, CASCADE_MAX_OPEN) {
            return self.hold(0.1);
        }

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let Some(weekly) = cross.avg_score(&r.symbol, &[Timeframe::W1]) else { continue };
            let Some(daily) = cross.avg_score(&r.symbol, &[Timeframe::D1]) else { continue };
            let short_tf = cross
                .avg_score(&r.symbol, &[Timeframe::H4])
                .or_else(|| cross.avg_score(&r.symbol, &[Timeframe::H1]));
            let Some(short_tf) = short_tf else { continue };

            if weekly >= 0.60 && daily >= 0.55 && short_tf <= 0.50 {
                if matches!(cross.higher_tf_regime, Some(RegimeTag::Bear)) {
                    continue;
                }
                let elevated = weekly >= 0.60 && daily >= 0.55 && matches!(cross.higher_tf_regime, Some(RegimeTag::Bull));
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(r.symbol.clone()),
                    size_pct: 0.12,
                    sl_pct: 0.06,
                    tp_pct: 0.10,
                    confidence: if elevated { (weekly + daily) / 2.0 } else { weekly },
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Cascade: no weekly-to-hourly cascade in progress. Holding.".to_string(),
            ActionKind::Close => format!(
                "Cascade: closing {} — weekly trend reverted or hourly cascade completed.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Cascade: {} shows the trend cascading down from weekly — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

pub struct RegimeStrategy;

const REGIME_MAX_OPEN: usize = 3;

impl Strategy for RegimeStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(cross) = &context.cross_timeframe else { return self.hold(0.0) };

        let direction_ok = matches!(cross.higher_tf_regime, Some(RegimeTag::Bull) | Some(RegimeTag::Bear));
        if !direction_ok || cross.higher_tf_confidence < 60 {
            return self.hold(0.1);
        }
        if context.portfolio.positions.len() >= REGIME_MAX_OPEN || !self.can_open_with_cap(context, REGIME_MAX_OPEN) {
            return self.hold(0.1);
        }

        let bullish = matches!(cross.higher_tf_regime, Some(RegimeTag::Bull));
        let mut best: Option<(&str, f64)> = None;

        for r in &context.primary_timeframe_rankings {
            if self.has_position(context, &r.symbol) {
                continue;
            }
            let aligned = cross.aligned_count(&r.symbol, &Timeframe::ALL, bullish);
            if aligned < 3 {
                continue;
            }
            let Some(avg) = cross.avg_score(&r.symbol, &Timeframe::ALL) else { continue };
            if best.map(|(_, b)| avg > b).unwrap_or(true) {
                best = Some((&r.symbol, avg));
            }
        }

        let Some((symbol, avg)) = best else { return self.hold(0.2) };

        if bullish {
            TradeAction {
                action: ActionKind::OpenLong,
                symbol: Some(symbol.to_string()),
                size_pct: 0.15,
                sl_pct: 0.05,
                tp_pct: 0.10,
                confidence: avg,
                reasoning: String::new(),
            }
        } else {
            TradeAction {
                action: ActionKind::OpenShort,
                symbol: Some(symbol.to_string()),
                size_pct: 0.15,
                sl_pct: 0.05,
                tp_pct: 0.10,
                confidence: 1.0 - avg,
                reasoning: String::new(),
            }
        }
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Regime: higher-timeframe trend not confident enough to trade. Holding.".to_string(),
            _ => format!(
                "Regime: best-aligned symbol {} in the prevailing higher-timeframe trend — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::empty_context;
    use crate::strategy::CrossTimeframeContext;

    #[test]
    fn confluence_holds_without_cross_timeframe_bundle() {
        let ctx = empty_context(vec![]);
        let action = ConfluenceStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }

    #[test]
    fn confluence_opens_long_on_bullish_set() {
        let mut ctx = empty_context(vec![]);
        ctx.cross_timeframe = Some(CrossTimeframeContext {
            bullish_confluence: vec!["BTCUSDT".to_string()],
            higher_tf_regime: Some(RegimeTag::Bull),
            ..Default::default()
        });
        let action = ConfluenceStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::OpenLong);
        assert_eq!(action.symbol.as_deref(), Some("BTCUSDT"));
        assert!(action.size_pct <= 0.25);
    }

    #[test]
    fn confluence_skips_bearish_regime() {
        let mut ctx = empty_context(vec![]);
        ctx.cross_timeframe = Some(CrossTimeframeContext {
            bullish_confluence: vec!["BTCUSDT".to_string()],
            higher_tf_regime: Some(RegimeTag::Bear),
            ..Default::default()
        });
        let action = ConfluenceStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }

    #[test]
    fn regime_requires_confidence_at_least_sixty() {
        let mut ctx = empty_context(vec![]);
        ctx.cross_timeframe = Some(CrossTimeframeContext {
            higher_tf_regime: Some(RegimeTag::Bull),
            higher_tf_confidence: 40,
            ..Default::default()
        });
        let action = RegimeStrategy.evaluate(&ctx);
        assert_eq!(action.action, ActionKind::Hold);
    }
}
