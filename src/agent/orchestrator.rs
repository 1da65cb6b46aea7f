// =============================================================================
// Agent Orchestrator (C10)
// =============================================================================
//
// One cycle per (timeframe, pipeline run): enumerate active agents whose
// primary timeframe matches, run each one's SL/TP check and unrealized-PnL
// refresh, build its context, invoke its strategy, validate and apply the
// resulting action, log the decision, and account for (zero, for rule
// engines) token usage. A strategy panic is caught at this boundary and
// recorded as a held decision instead of aborting the other agents' cycles
// — the same isolation the pipeline runner gives a single failing symbol.
// =============================================================================

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::Utc;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::candle::Candle;
use crate::error::EngineError;
use crate::pipeline::runner::SymbolBar;
use crate::portfolio::PortfolioManager;
use crate::store::{Agent, AgentDecision, Store};
use crate::strategy::Archetype;
use crate::types::{ActionKind, Engine, ExitReason, Timeframe, TradeAction};

use super::context;

const PROMPT_VERSION: i32 = 1;
const RULE_MODEL: &str = "rule_engine";
const EXTERNAL_MODEL: &str = "external";
const TASK_TYPE: &str = "trade_decision";
const REASONING_SUMMARY_MAX_LEN: usize = 500;

/// The orchestrator only ever needs high/low/close for SL/TP and pricing;
/// open/volume/trade-count are zeroed rather than refetched.
fn bar_candle(bar: &SymbolBar) -> Candle {
    Candle::new(0, bar.close, bar.high, bar.low, bar.close, 0.0, 0, 0.0, 0)
}

fn reasoning_summary(reasoning: &str) -> String {
    if reasoning.len() > REASONING_SUMMARY_MAX_LEN {
        reasoning.chars().take(REASONING_SUMMARY_MAX_LEN).collect()
    } else {
        reasoning.to_string()
    }
}

/// Runs one cycle for every active agent whose primary timeframe equals
/// `timeframe`. `bars` is the per-symbol close/high/low the triggering
/// pipeline run just produced for this tick.
#[instrument(skip(store, portfolio_manager, bars))]
pub fn run_cycle(store: &Store, portfolio_manager: &PortfolioManager, timeframe: Timeframe, bars: &HashMap<String, SymbolBar>) {
    let current_prices: HashMap<String, f64> = bars.iter().map(|(symbol, bar)| (symbol.clone(), bar.close)).collect();
    let candle_data: HashMap<String, Candle> = bars.iter().map(|(symbol, bar)| (symbol.clone(), bar_candle(bar))).collect();

    for agent in store.active_agents() {
        if agent.primary_timeframe != timeframe {
            continue;
        }
        run_agent_cycle(store, portfolio_manager, &agent, &current_prices, &candle_data);
    }
}

fn run_agent_cycle(
    store: &Store,
    portfolio_manager: &PortfolioManager,
    agent: &Agent,
    current_prices: &HashMap<String, f64>,
    candle_data: &HashMap<String, Candle>,
) {
    // a./b. passive SL/TP and equity refresh always run first, ahead of any
    // strategy-driven open/close in the same cycle.
    portfolio_manager.check_stop_loss_take_profit(&agent.id, candle_data);
    portfolio_manager.update_unrealized_pnl(&agent.id, current_prices);

    if agent.engine == Engine::Llm {
        persist_decision(store, agent, &TradeAction::hold("llm engine is an external collaborator"), EXTERNAL_MODEL);
        store.record_token_usage(&agent.id, EXTERNAL_MODEL, TASK_TYPE, Utc::now().date_naive(), 0, 0, 0.0);
        return;
    }

    let Some(archetype) = Archetype::from_str_name(&agent.archetype) else {
        warn!(agent_id = %agent.id, archetype = %agent.archetype, "unknown archetype — holding");
        persist_decision(store, agent, &TradeAction::hold(format!("unknown archetype: {}", agent.archetype)), RULE_MODEL);
        store.record_token_usage(&agent.id, RULE_MODEL, TASK_TYPE, Utc::now().date_naive(), 0, 0, 0.0);
        return;
    };

    // c. assemble context
    let ctx = context::build(store, agent, current_prices.clone());

    // d./e. invoke the strategy; a panic degrades to a held decision rather
    // than unwinding into the caller's loop over every other agent.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let action = archetype.evaluate(&ctx);
        let reasoning = archetype.generate_reasoning(&ctx, &action);
        (action, reasoning)
    }));

    let (mut action, reasoning) = match outcome {
        Ok(pair) => pair,
        Err(_) => {
            let err = EngineError::Strategy { reason: format!("strategy evaluation panicked for archetype {}", agent.archetype) };
            warn!(agent_id = %agent.id, error = %err, "strategy error — holding");
            let hold = TradeAction::hold(err.to_string());
            (hold.clone(), hold.reasoning)
        }
    };
    action.reasoning = reasoning.clone();

    let decision_id = Uuid::new_v4().to_string();

    // g. validate and apply — only strategy-driven closes carry a decision
    // id onto their trade; SL/TP exits above are not agent decisions.
    if action.action != ActionKind::Hold {
        let validation = portfolio_manager.validate(&agent.id, &action, current_prices);
        if validation.valid {
            apply_action(portfolio_manager, agent, &action, current_prices, &decision_id);
        } else {
            warn!(agent_id = %agent.id, reason = ?validation.error_message, action = %action.action, "action rejected by validation");
        }
    }

    persist_decision_with_id(store, agent, &action, RULE_MODEL, decision_id);

    // h. write-only accounting table; zero for every rule-engine cycle.
    store.record_token_usage(&agent.id, RULE_MODEL, TASK_TYPE, Utc::now().date_naive(), 0, 0, 0.0);
}

fn apply_action(
    portfolio_manager: &PortfolioManager,
    agent: &Agent,
    action: &TradeAction,
    current_prices: &HashMap<String, f64>,
    decision_id: &str,
) {
    match action.action {
        ActionKind::OpenLong | ActionKind::OpenShort => {
            let (Some(symbol), Some(&price)) =
                (action.symbol.as_ref(), action.symbol.as_ref().and_then(|s| current_prices.get(s)))
            else {
                warn!(agent_id = %agent.id, "open action missing symbol or current price");
                return;
            };
            let result = portfolio_manager.open_position(&agent.id, action, price);
            if !result.success {
                warn!(agent_id = %agent.id, symbol = %symbol, decision_id = %decision_id, error = ?result.error, "open_position failed");
            }
        }
        ActionKind::Close => {
            let Some(symbol) = action.symbol.as_ref() else {
                warn!(agent_id = %agent.id, "close action missing symbol");
                return;
            };
            let Some(&price) = current_prices.get(symbol) else {
                warn!(agent_id = %agent.id, symbol = %symbol, "no current price for close");
                return;
            };
            let result =
                portfolio_manager.close_position(&agent.id, symbol, price, ExitReason::AgentDecision, Some(decision_id));
            if !result.success {
                warn!(agent_id = %agent.id, symbol = %symbol, decision_id = %decision_id, error = ?result.error, "close_position failed");
            }
        }
        ActionKind::Hold => {}
    }
}

fn persist_decision(store: &Store, agent: &Agent, action: &TradeAction, model: &str) {
    persist_decision_with_id(store, agent, action, model, Uuid::new_v4().to_string());
}

fn persist_decision_with_id(store: &Store, agent: &Agent, action: &TradeAction, model: &str, decision_id: String) {
    let reasoning = action.reasoning.clone();
    store.insert_decision(AgentDecision {
        id: decision_id,
        agent_id: agent.id.clone(),
        action: action.action.to_string(),
        symbol: action.symbol.clone(),
        reasoning_summary: reasoning_summary(&reasoning),
        reasoning,
        params: json!({
            "size_pct": action.size_pct,
            "sl_pct": action.sl_pct,
            "tp_pct": action.tp_pct,
            "confidence": action.confidence,
        }),
        model: model.to_string(),
        prompt_tokens: 0,
        completion_tokens: 0,
        cost: 0.0,
        prompt_version: PROMPT_VERSION,
        decided_at: Utc::now().timestamp_millis(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::TracingNotifier;
    use crate::portfolio::new_portfolio;
    use crate::store::StoredSymbol;
    use crate::types::{AgentSource, AgentStatus};
    use std::sync::Arc;

    fn test_agent(archetype: &str, timeframe: Timeframe) -> Agent {
        Agent {
            id: "a1".to_string(),
            name: "test-agent".to_string(),
            display_name: "Test Agent".to_string(),
            archetype: archetype.to_string(),
            primary_timeframe: timeframe,
            engine: Engine::Rule,
            source: AgentSource::Technical,
            status: AgentStatus::Active,
            initial_balance: 10_000.0,
            evolution_threshold: 0.0,
        }
    }

    #[test]
    fn unknown_archetype_holds_and_logs_a_decision() {
        let store = Store::new();
        let manager = PortfolioManager::new(Arc::new(Store::new()), Arc::new(TracingNotifier));
        let agent = test_agent("not_a_real_archetype", Timeframe::H1);
        store.upsert_agent(agent.clone());
        store.upsert_portfolio(new_portfolio(&agent.id, 10_000.0));

        run_agent_cycle(&store, &manager, &agent, &HashMap::new(), &HashMap::new());

        let decisions = store.decisions_for_agent("a1");
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, "hold");
    }

    #[test]
    fn cycle_skips_agents_on_a_different_timeframe() {
        let store = Store::new();
        let manager = PortfolioManager::new(Arc::new(Store::new()), Arc::new(TracingNotifier));
        let agent = test_agent("momentum", Timeframe::D1);
        store.upsert_agent(agent.clone());
        store.upsert_portfolio(new_portfolio(&agent.id, 10_000.0));

        run_cycle(&store, &manager, Timeframe::H1, &HashMap::new());

        assert!(store.decisions_for_agent("a1").is_empty());
    }

    #[test]
    fn llm_engine_agents_hold_with_external_model() {
        let store = Store::new();
        let manager = PortfolioManager::new(Arc::new(Store::new()), Arc::new(TracingNotifier));
        let mut agent = test_agent("momentum", Timeframe::H1);
        agent.engine = Engine::Llm;
        store.upsert_agent(agent.clone());
        store.upsert_portfolio(new_portfolio(&agent.id, 10_000.0));

        run_agent_cycle(&store, &manager, &agent, &HashMap::new(), &HashMap::new());

        let decisions = store.decisions_for_agent("a1");
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].model, "external");
    }

    #[test]
    fn momentum_agent_with_no_rankings_holds_without_crashing() {
        let store = Arc::new(Store::new());
        let manager = PortfolioManager::new(store.clone(), Arc::new(TracingNotifier));
        let agent = test_agent("momentum", Timeframe::H1);
        store.upsert_agent(agent.clone());
        store.upsert_portfolio(new_portfolio(&agent.id, 10_000.0));
        store.upsert_symbol(StoredSymbol {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            active: true,
            last_seen_at: 0,
        });

        run_cycle(&store, &manager, Timeframe::H1, &HashMap::new());

        let decisions = store.decisions_for_agent("a1");
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, "hold");
        assert_eq!(store.token_usage_for_agent("a1").len(), 1);
    }
}
