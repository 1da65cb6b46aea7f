// S4 — cross-timeframe regime veto. A symbol sits in the bullish-confluence
// set, but the persisted higher-timeframe regime call is a high-confidence
// downtrend — the confluence archetype must hold rather than open against
// it.

use std::collections::HashMap;

use aurora_arena::strategy::{Archetype, CrossTimeframeContext, PerformanceStats, PortfolioSummary, RegimeTag};
use aurora_arena::types::ActionKind;

fn build_context(cross: CrossTimeframeContext) -> aurora_arena::strategy::AgentContext {
    aurora_arena::strategy::AgentContext {
        agent_id: "agent-1".to_string(),
        portfolio: PortfolioSummary {
            cash_balance: 10_000.0,
            total_equity: 10_000.0,
            positions: Vec::new(),
            available_for_new_position: 2_500.0,
        },
        performance: PerformanceStats::default(),
        primary_timeframe_rankings: Vec::new(),
        cross_timeframe: Some(cross),
        tweet: None,
        current_prices: HashMap::new(),
        recent_memory: Vec::new(),
    }
}

#[test]
fn confluence_strategy_holds_against_a_high_confidence_bear_regime() {
    let cross = CrossTimeframeContext {
        bullish_confluence: vec!["BTCUSDT".to_string()],
        bearish_confluence: Vec::new(),
        scores: HashMap::new(),
        higher_tf_regime: Some(RegimeTag::Bear),
        higher_tf_confidence: 70,
    };

    let context = build_context(cross);
    let action = Archetype::CrossConfluence.evaluate(&context);

    assert_eq!(action.action, ActionKind::Hold);
    assert!(action.symbol.is_none());
}
