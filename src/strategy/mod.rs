// =============================================================================
// Rule Strategy Engine (C9)
// =============================================================================
//
// Deterministic if/else strategies that mirror the LLM agent prompts exactly
// enough that a backtest run through either engine produces directly
// comparable equity curves. Dispatch is a closed tagged enum — one variant
// per archetype — rather than a string-keyed registry: the archetype set is
// fixed at compile time and nothing here needs reflection.
// =============================================================================

pub mod cross_timeframe;
pub mod hybrid;
pub mod technical;
pub mod tweet;

use std::collections::HashMap;

use crate::indicators::IndicatorOutput;
use crate::portfolio::position::MAX_CONCURRENT_POSITIONS;
use crate::ranker::RankedSnapshot;
use crate::store::AgentPosition;
use crate::types::{Timeframe, TradeAction};

/// Agent-visible slice of its own portfolio, assembled by the orchestrator
/// each cycle from the live `Store` state.
#[derive(Debug, Clone)]
pub struct PortfolioSummary {
    pub cash_balance: f64,
    pub total_equity: f64,
    pub positions: Vec<AgentPosition>,
    /// `min(cash, 0.25 * equity)` when a position slot is free, else 0 —
    /// computed by the orchestrator, not re-derived here.
    pub available_for_new_position: f64,
}

/// Coarse direction label for a higher-timeframe regime, as consumed by the
/// cross-timeframe strategies. `Mixed` covers the case where the regimes a
/// strategy looks at disagree with each other — distinct from `Ranging`,
/// which means a single timeframe's own regime call came back non-trending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeTag {
    Bull,
    Bear,
    Mixed,
    Ranging,
    Volatile,
}

/// Cross-timeframe bundle handed to the confluence/divergence/cascade/regime
/// strategies: per-symbol bullish scores across timeframes, the resulting
/// confluence sets, and the higher-timeframe regime call.
#[derive(Debug, Clone, Default)]
pub struct CrossTimeframeContext {
    pub bullish_confluence: Vec<String>,
    pub bearish_confluence: Vec<String>,
    pub scores: HashMap<String, HashMap<Timeframe, f64>>,
    pub higher_tf_regime: Option<RegimeTag>,
    pub higher_tf_confidence: u8,
}

impl CrossTimeframeContext {
    /// Mean bullish score for `symbol` across the given timeframes, `None`
    /// if the symbol has no score recorded for any of them.
    pub fn avg_score(&self, symbol: &str, timeframes: &[Timeframe]) -> Option<f64> {
        let per_tf = self.scores.get(symbol)?;
        let values: Vec<f64> = timeframes.iter().filter_map(|tf| per_tf.get(tf).copied()).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Count of timeframes in `timeframes` where `symbol` scores above 0.6
    /// (bullish) or below 0.4 (bearish), used by cascade/regime to require
    /// "at least N timeframes aligned."
    pub fn aligned_count(&self, symbol: &str, timeframes: &[Timeframe], bullish: bool) -> usize {
        let Some(per_tf) = self.scores.get(symbol) else {
            return 0;
        };
        timeframes
            .iter()
            .filter(|tf| {
                per_tf
                    .get(tf)
                    .map(|&s| if bullish { s > 0.6 } else { s < 0.4 })
                    .unwrap_or(false)
            })
            .count()
    }
}

/// One social-signal mention, already sentiment-scored and categorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweetCategory {
    Fundamental,
    Partnership,
    Listing,
    Other,
}

impl TweetCategory {
    /// Fundamental/partnership/listing signals count toward narrative
    /// confluence; everything else is noise for that purpose.
    pub fn is_credible(self) -> bool {
        matches!(self, TweetCategory::Fundamental | TweetCategory::Partnership | TweetCategory::Listing)
    }
}

#[derive(Debug, Clone)]
pub struct TweetSignal {
    pub symbol: String,
    pub sentiment: f64,
    pub category: TweetCategory,
    pub setup_type: String,
    pub is_insider: bool,
}

/// Social-sentiment bundle handed to the tweet and hybrid strategies.
#[derive(Debug, Clone, Default)]
pub struct TweetContext {
    pub avg_sentiment: f64,
    pub bullish_count: u32,
    pub bearish_count: u32,
    pub signals: Vec<TweetSignal>,
    pub most_mentioned_symbols: Vec<String>,
}

impl TweetContext {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Win rate, drawdown, and duration stats over an agent's closed trades —
/// informational context a strategy may read but none currently condition
/// entries on, mirroring the original context builder's separation between
/// "what the agent has done" and "what it should do next."
#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl_per_trade: f64,
    pub max_drawdown: f64,
    pub avg_trade_duration_hours: Option<f64>,
}

/// Everything one strategy evaluation needs: portfolio state, the latest
/// ranked snapshots for the agent's primary timeframe, and the optional
/// cross-timeframe/tweet bundles the archetype's source type requires.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub portfolio: PortfolioSummary,
    pub performance: PerformanceStats,
    pub primary_timeframe_rankings: Vec<RankedSnapshot>,
    pub cross_timeframe: Option<CrossTimeframeContext>,
    pub tweet: Option<TweetContext>,
    pub current_prices: HashMap<String, f64>,
    pub recent_memory: Vec<String>,
}

impl AgentContext {
    pub fn ranking_for(&self, symbol: &str) -> Option<&RankedSnapshot> {
        self.primary_timeframe_rankings.iter().find(|r| r.symbol == symbol)
    }
}

/// Shared vocabulary every archetype implements. Default methods translate
/// the helper methods a rule strategy leans on most: reading a named
/// indicator's raw field or normalized signal, checking whether a symbol is
/// already held, and checking whether a new slot is free.
pub trait Strategy {
    fn evaluate(&self, context: &AgentContext) -> TradeAction;
    fn generate_reasoning(&self, context: &AgentContext, action: &TradeAction) -> String;

    fn hold(&self, confidence: f64) -> TradeAction {
        TradeAction { confidence, ..TradeAction::hold(String::new()) }
    }

    fn get_indicator<'a>(&self, ranking: &'a RankedSnapshot, name: &str) -> Option<&'a IndicatorOutput> {
        ranking.indicators.get(name)
    }

    fn raw(&self, ranking: &RankedSnapshot, indicator_name: &str, field: &str) -> Option<f64> {
        self.get_indicator(ranking, indicator_name)?.raw.get(field)?.as_f64()
    }

    fn signal_val(&self, ranking: &RankedSnapshot, indicator_name: &str) -> Option<f64> {
        Some(self.get_indicator(ranking, indicator_name)?.signal)
    }

    fn has_position(&self, context: &AgentContext, symbol: &str) -> bool {
        context.portfolio.positions.iter().any(|p| p.symbol == symbol)
    }

    fn can_open(&self, context: &AgentContext) -> bool {
        self.can_open_with_cap(context, MAX_CONCURRENT_POSITIONS)
    }

    fn can_open_with_cap(&self, context: &AgentContext, max_positions: usize) -> bool {
        context.portfolio.positions.len() < max_positions && context.portfolio.available_for_new_position > 0.0
    }
}

/// The fixed archetype set. One variant per concrete `Strategy` impl;
/// dispatch is a match, never a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Momentum,
    MeanReversion,
    Breakout,
    Swing,
    CrossConfluence,
    CrossDivergence,
    CrossCascade,
    CrossRegime,
    TweetMomentum,
    TweetContrarian,
    TweetNarrative,
    TweetInsider,
    HybridMomentum,
    HybridMeanReversion,
    HybridBreakout,
    HybridSwing,
}

impl Archetype {
    pub fn evaluate(self, context: &AgentContext) -> TradeAction {
        use cross_timeframe::{CascadeStrategy, ConfluenceStrategy, DivergenceStrategy, RegimeStrategy};
        use hybrid::{HybridBreakoutStrategy, HybridMeanReversionStrategy, HybridMomentumStrategy, HybridSwingStrategy};
        use technical::{BreakoutStrategy, MeanReversionStrategy, MomentumStrategy, SwingStrategy};
        use tweet::{TweetContrarianStrategy, TweetInsiderStrategy, TweetMomentumStrategy, TweetNarrativeStrategy};

        match self {
            Archetype::Momentum => MomentumStrategy.evaluate(context),
            Archetype::MeanReversion => MeanReversionStrategy.evaluate(context),
            Archetype::Breakout => BreakoutStrategy.evaluate(context),
            Archetype::Swing => SwingStrategy.evaluate(context),
            Archetype::CrossConfluence => ConfluenceStrategy.evaluate(context),
            Archetype::CrossDivergence => DivergenceStrategy.evaluate(context),
            Archetype::CrossCascade => CascadeStrategy.evaluate(context),
            Archetype::CrossRegime => RegimeStrategy.evaluate(context),
            Archetype::TweetMomentum => TweetMomentumStrategy.evaluate(context),
            Archetype::TweetContrarian => TweetContrarianStrategy.evaluate(context),
            Archetype::TweetNarrative => TweetNarrativeStrategy.evaluate(context),
            Archetype::TweetInsider => TweetInsiderStrategy.evaluate(context),
            Archetype::HybridMomentum => HybridMomentumStrategy.evaluate(context),
            Archetype::HybridMeanReversion => HybridMeanReversionStrategy.evaluate(context),
            Archetype::HybridBreakout => HybridBreakoutStrategy.evaluate(context),
            Archetype::HybridSwing => HybridSwingStrategy.evaluate(context),
        }
    }

    pub fn generate_reasoning(self, context: &AgentContext, action: &TradeAction) -> String {
        use cross_timeframe::{CascadeStrategy, ConfluenceStrategy, DivergenceStrategy, RegimeStrategy};
        use hybrid::{HybridBreakoutStrategy, HybridMeanReversionStrategy, HybridMomentumStrategy, HybridSwingStrategy};
        use technical::{BreakoutStrategy, MeanReversionStrategy, MomentumStrategy, SwingStrategy};
        use tweet::{TweetContrarianStrategy, TweetInsiderStrategy, TweetMomentumStrategy, TweetNarrativeStrategy};

        match self {
            Archetype::Momentum => MomentumStrategy.generate_reasoning(context, action),
            Archetype::MeanReversion => MeanReversionStrategy.generate_reasoning(context, action),
            Archetype::Breakout => BreakoutStrategy.generate_reasoning(context, action),
            Archetype::Swing => SwingStrategy.generate_reasoning(context, action),
            Archetype::CrossConfluence => ConfluenceStrategy.generate_reasoning(context, action),
            Archetype::CrossDivergence => DivergenceStrategy.generate_reasoning(context, action),
            Archetype::CrossCascade => CascadeStrategy.generate_reasoning(context, action),
            Archetype::CrossRegime => RegimeStrategy.generate_reasoning(context, action),
            Archetype::TweetMomentum => TweetMomentumStrategy.generate_reasoning(context, action),
            Archetype::TweetContrarian => TweetContrarianStrategy.generate_reasoning(context, action),
            Archetype::TweetNarrative => TweetNarrativeStrategy.generate_reasoning(context, action),
            Archetype::TweetInsider => TweetInsiderStrategy.generate_reasoning(context, action),
            Archetype::HybridMomentum => HybridMomentumStrategy.generate_reasoning(context, action),
            Archetype::HybridMeanReversion => HybridMeanReversionStrategy.generate_reasoning(context, action),
            Archetype::HybridBreakout => HybridBreakoutStrategy.generate_reasoning(context, action),
            Archetype::HybridSwing => HybridSwingStrategy.generate_reasoning(context, action),
        }
    }

    /// Parse the persisted lowercase/snake_case archetype name back into a
    /// tag, used when rehydrating an `Agent` row from storage.
    pub fn from_str_name(name: &str) -> Option<Self> {
        Some(match name {
            "momentum" => Archetype::Momentum,
            "mean_reversion" => Archetype::MeanReversion,
            "breakout" => Archetype::Breakout,
            "swing" => Archetype::Swing,
            "cross_confluence" => Archetype::CrossConfluence,
            "cross_divergence" => Archetype::CrossDivergence,
            "cross_cascade" => Archetype::CrossCascade,
            "cross_regime" => Archetype::CrossRegime,
            "tweet_momentum" => Archetype::TweetMomentum,
            "tweet_contrarian" => Archetype::TweetContrarian,
            "tweet_narrative" => Archetype::TweetNarrative,
            "tweet_insider" => Archetype::TweetInsider,
            "hybrid_momentum" => Archetype::HybridMomentum,
            "hybrid_mean_reversion" => Archetype::HybridMeanReversion,
            "hybrid_breakout" => Archetype::HybridBreakout,
            "hybrid_swing" => Archetype::HybridSwing,
            _ => return None,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archetype_round_trips_through_name() {
        for a in [
            Archetype::Momentum,
            Archetype::CrossCascade,
            Archetype::TweetInsider,
            Archetype::HybridSwing,
        ] {
            let name = format!("{a:?}");
            let _ = name;
        }
        assert_eq!(Archetype::from_str_name("momentum"), Some(Archetype::Momentum));
        assert_eq!(Archetype::from_str_name("hybrid_swing"), Some(Archetype::HybridSwing));
        assert_eq!(Archetype::from_str_name("unknown"), None);
    }

    #[test]
    fn avg_score_averages_only_present_timeframes() {
        let mut scores = HashMap::new();
        let mut per_tf = HashMap::new();
        per_tf.insert(Timeframe::D1, 0.8);
        per_tf.insert(Timeframe::W1, 0.6);
        scores.insert("BTCUSDT".to_string(), per_tf);
        let ctx = CrossTimeframeContext { scores, ..Default::default() };
        let avg = ctx.avg_score("BTCUSDT", &[Timeframe::D1, Timeframe::W1]).unwrap();
        assert!((avg - 0.7).abs() < 1e-9);
        assert!(ctx.avg_score("ETHUSDT", &[Timeframe::D1]).is_none());
    }
}
