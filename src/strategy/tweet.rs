// =============================================================================
// Tweet-only archetypes: momentum (ride), contrarian (fade), narrative,
// insider.
// =============================================================================
//
// All four read only `context.tweet` — none look at the technical rankings.
// All four degrade to hold when the bundle carries no signals this cycle.
// =============================================================================

use crate::strategy::TweetContext;
use crate::types::{ActionKind, TradeAction};

use super::{AgentContext, Strategy};

fn no_signals_hold(tweet: &TweetContext) -> Option<TradeAction> {
    if tweet.is_empty() {
        Some(TradeAction::hold("No tweet signals this cycle."))
    } else {
        None
    }
}

pub struct TweetMomentumStrategy;

impl Strategy for TweetMomentumStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(tweet) = &context.tweet else { return self.hold(0.0) };
        if let Some(h) = no_signals_hold(tweet) {
            return h;
        }

        for pos in &context.portfolio.positions {
            if pos.direction == crate::types::Direction::Long && tweet.avg_sentiment <= 0.0 {
                return TradeAction {
                    action: ActionKind::Close,
                    symbol: Some(pos.symbol.clone()),
                    confidence: 0.6,
                    ..TradeAction::hold(String::new())
                };
            }
        }

        if !self.can_open(context) {
            return self.hold(0.1);
        }

        if tweet.avg_sentiment >= 0.5 && tweet.bullish_count >= tweet.bearish_count.saturating_mul(2) {
            if let Some(symbol) = tweet.most_mentioned_symbols.first() {
                if !self.has_position(context, symbol) {
                    return TradeAction {
                        action: ActionKind::OpenLong,
                        symbol: Some(symbol.clone()),
                        size_pct: 0.12,
                        sl_pct: 0.05,
                        tp_pct: 0.10,
                        confidence: tweet.avg_sentiment,
                        reasoning: String::new(),
                    };
                }
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Tweet momentum: sentiment not decisively bullish. Holding.".to_string(),
            ActionKind::Close => format!(
                "Tweet momentum: closing {} — sentiment reversed.",
                action.symbol.as_deref().unwrap_or("position")
            ),
            _ => format!(
                "Tweet momentum: riding bullish chatter on {} — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

pub struct TweetContrarianStrategy;

impl Strategy for TweetContrarianStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(tweet) = &context.tweet else { return self.hold(0.0) };
        if let Some(h) = no_signals_hold(tweet) {
            return h;
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        let Some(symbol) = tweet.most_mentioned_symbols.first() else { return self.hold(0.2) };
        if self.has_position(context, symbol) {
            return self.hold(0.1);
        }

        if tweet.avg_sentiment >= 0.8 {
            return TradeAction {
                action: ActionKind::OpenShort,
                symbol: Some(symbol.clone()),
                size_pct: 0.08,
                sl_pct: 0.04,
                tp_pct: 0.08,
                confidence: tweet.avg_sentiment,
                reasoning: String::new(),
            };
        }
        if tweet.avg_sentiment <= -0.8 {
            return TradeAction {
                action: ActionKind::OpenLong,
                symbol: Some(symbol.clone()),
                size_pct: 0.08,
                sl_pct: 0.04,
                tp_pct: 0.08,
                confidence: -tweet.avg_sentiment,
                reasoning: String::new(),
            };
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Tweet contrarian: no sentiment extreme to fade. Holding.".to_string(),
            _ => format!(
                "Tweet contrarian: fading an extreme sentiment reading on {} — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

pub struct TweetNarrativeStrategy;

const CREDIBLE_MAJORITY: usize = 3;

impl Strategy for TweetNarrativeStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(tweet) = &context.tweet else { return self.hold(0.0) };
        if let Some(h) = no_signals_hold(tweet) {
            return h;
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for symbol in &tweet.most_mentioned_symbols {
            if self.has_position(context, symbol) {
                continue;
            }
            let credible: Vec<_> = tweet
                .signals
                .iter()
                .filter(|s| &s.symbol == symbol && s.category.is_credible())
                .collect();
            if credible.len() < CREDIBLE_MAJORITY {
                continue;
            }
            let bullish = credible.iter().filter(|s| s.sentiment > 0.0).count();
            let bearish = credible.iter().filter(|s| s.sentiment < 0.0).count();
            if bullish >= CREDIBLE_MAJORITY && bullish > bearish {
                let avg = credible.iter().map(|s| s.sentiment).sum::<f64>() / credible.len() as f64;
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.05,
                    tp_pct: 0.09,
                    confidence: avg.abs(),
                    reasoning: String::new(),
                };
            }
            if bearish >= CREDIBLE_MAJORITY && bearish > bullish {
                let avg = credible.iter().map(|s| s.sentiment).sum::<f64>() / credible.len() as f64;
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.05,
                    tp_pct: 0.09,
                    confidence: avg.abs(),
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Tweet narrative: no credible-category majority found. Holding.".to_string(),
            _ => format!(
                "Tweet narrative: fundamental/partnership/listing signals agree on {} — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}

pub struct TweetInsiderStrategy;

const INSIDER_WEIGHTED_MAJORITY: i32 = 3;

impl Strategy for TweetInsiderStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        let Some(tweet) = &context.tweet else { return self.hold(0.0) };
        if let Some(h) = no_signals_hold(tweet) {
            return h;
        }
        if !self.can_open(context) {
            return self.hold(0.1);
        }

        for symbol in &tweet.most_mentioned_symbols {
            if self.has_position(context, symbol) {
                continue;
            }
            let signals: Vec<_> = tweet.signals.iter().filter(|s| &s.symbol == symbol).collect();
            if signals.is_empty() {
                continue;
            }

            let mut tally: i32 = 0;
            for s in &signals {
                let weight = if s.is_insider { 2 } else { 1 };
                if s.sentiment > 0.0 {
                    tally += weight;
                } else if s.sentiment < 0.0 {
                    tally -= weight;
                }
            }

            if tally >= INSIDER_WEIGHTED_MAJORITY {
                let avg = signals.iter().map(|s| s.sentiment).sum::<f64>() / signals.len() as f64;
                return TradeAction {
                    action: ActionKind::OpenLong,
                    symbol: Some(symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.06,
                    tp_pct: 0.12,
                    confidence: avg.abs().max(0.5),
                    reasoning: String::new(),
                };
            }
            if tally <= -INSIDER_WEIGHTED_MAJORITY {
                let avg = signals.iter().map(|s| s.sentiment).sum::<f64>() / signals.len() as f64;
                return TradeAction {
                    action: ActionKind::OpenShort,
                    symbol: Some(symbol.clone()),
                    size_pct: 0.10,
                    sl_pct: 0.06,
                    tp_pct: 0.12,
                    confidence: avg.abs().max(0.5),
                    reasoning: String::new(),
                };
            }
        }

        self.hold(0.2)
    }

    fn generate_reasoning(&self, _context: &AgentContext, action: &TradeAction) -> String {
        match action.action {
            ActionKind::Hold => "Tweet insider: no doubled-weight majority found. Holding.".to_string(),
            _ => format!(
                "Tweet insider: insider-tagged signals tip the balance on {} — confidence={:.2}.",
                action.symbol.as_deref().unwrap_or(""),
                action.confidence
            ),
        }
    }
}
