// =============================================================================
// Hybrid archetypes: each technical archetype (momentum, mean reversion,
// breakout, swing) plus a tweet overlay.
// =============================================================================
//
// The overlay never re-derives the underlying technical decision — it
// delegates to the matching `technical` strategy, then adjusts the result:
// a same-direction tweet signal of at least moderate magnitude boosts size
// (capped at 25%), an opposing one halves it (the setup is already
// favorable or the base strategy wouldn't have opened), and three or more
// strongly opposing signals on an open position override the exit
// regardless of what the technical exit condition says. With no tweet
// context, or an empty one, every hybrid is byte-for-byte its technical
// counterpart.
// =============================================================================

use crate::store::AgentPosition;
use crate::types::{ActionKind, Direction, TradeAction};

use super::technical::{BreakoutStrategy, MeanReversionStrategy, MomentumStrategy, SwingStrategy};
use super::{AgentContext, Strategy, TweetContext};

const AGREE_THRESHOLD: f64 = 0.5;
const REVERSAL_MIN_SIGNALS: usize = 3;
const REVERSAL_SENTIMENT: f64 = 0.6;

fn symbol_sentiment(tweet: &TweetContext, symbol: &str) -> f64 {
    let matching: Vec<f64> = tweet.signals.iter().filter(|s| s.symbol == symbol).map(|s| s.sentiment).collect();
    if matching.is_empty() {
        tweet.avg_sentiment
    } else {
        matching.iter().sum::<f64>() / matching.len() as f64
    }
}

fn reversal_override(tweet: &TweetContext, position: &AgentPosition) -> Option<TradeAction> {
    let matching: Vec<f64> = tweet.signals.iter().filter(|s| s.symbol == position.symbol).map(|s| s.sentiment).collect();
    if matching.len() < REVERSAL_MIN_SIGNALS {
        return None;
    }
    let avg = matching.iter().sum::<f64>() / matching.len() as f64;
    let opposing_count = matching
        .iter()
        .filter(|&&s| match position.direction {
            Direction::Long => s < 0.0,
            Direction::Short => s > 0.0,
        })
        .count();
    let avg_opposes = match position.direction {
        Direction::Long => avg < 0.0,
        Direction::Short => avg > 0.0,
    };

    if opposing_count >= REVERSAL_MIN_SIGNALS && avg_opposes && avg.abs() >= REVERSAL_SENTIMENT {
        Some(TradeAction {
            action: ActionKind::Close,
            symbol: Some(position.symbol.clone()),
            confidence: avg.abs(),
            ..TradeAction::hold(String::new())
        })
    } else {
        None
    }
}

fn apply_entry_overlay(mut action: TradeAction, tweet: &TweetContext) -> TradeAction {
    let Some(symbol) = action.symbol.clone() else { return action };
    let sentiment = symbol_sentiment(tweet, &symbol);
    let direction_sign = if action.action == ActionKind::OpenLong { 1.0 } else { -1.0 };
    let signed = sentiment * direction_sign;

    if signed >= AGREE_THRESHOLD {
        action.size_pct = (action.size_pct * 1.5).min(0.25);
    } else if signed <= -AGREE_THRESHOLD {
        action.size_pct *= 0.5;
    }
    action
}

/// Runs the reversal check, then delegates to `base` and applies the entry
/// overlay — shared by all four hybrid archetypes.
fn evaluate_hybrid(context: &AgentContext, base: &dyn Strategy) -> TradeAction {
    if let Some(tweet) = &context.tweet {
        if !tweet.is_empty() {
            for pos in &context.portfolio.positions {
                if let Some(close) = reversal_override(tweet, pos) {
                    return close;
                }
            }
        }
    }

    let action = base.evaluate(context);

    match (&context.tweet, action.action) {
        (Some(tweet), ActionKind::OpenLong | ActionKind::OpenShort) if !tweet.is_empty() => {
            apply_entry_overlay(action, tweet)
        }
        _ => action,
    }
}

pub struct HybridMomentumStrategy;

impl Strategy for HybridMomentumStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        evaluate_hybrid(context, &MomentumStrategy)
    }

    fn generate_reasoning(&self, context: &AgentContext, action: &TradeAction) -> String {
        format!("Hybrid momentum: {}", MomentumStrategy.generate_reasoning(context, action))
    }
}

pub struct HybridMeanReversionStrategy;

impl Strategy for HybridMeanReversionStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        evaluate_hybrid(context, &MeanReversionStrategy)
    }

    fn generate_reasoning(&self, context: &AgentContext, action: &TradeAction) -> String {
        format!("Hybrid mean reversion: {}", MeanReversionStrategy.generate_reasoning(context, action))
    }
}

pub struct HybridBreakoutStrategy;

impl Strategy for HybridBreakoutStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        evaluate_hybrid(context, &BreakoutStrategy)
    }

    fn generate_reasoning(&self, context: &AgentContext, action: &TradeAction) -> String {
        format!("Hybrid breakout: {}", BreakoutStrategy.generate_reasoning(context, action))
    }
}

pub struct HybridSwingStrategy;

impl Strategy for HybridSwingStrategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction {
        evaluate_hybrid(context, &SwingStrategy)
    }

    fn generate_reasoning(&self, context: &AgentContext, action: &TradeAction) -> String {
        format!("Hybrid swing: {}", SwingStrategy.generate_reasoning(context, action))
    }
}
