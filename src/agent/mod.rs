// =============================================================================
// Agent lifecycle & Agent Orchestrator (C10)
// =============================================================================

pub mod context;
pub mod orchestrator;

use uuid::Uuid;

use crate::portfolio::new_portfolio;
use crate::store::{Agent, Store};
use crate::types::{AgentSource, AgentStatus, Engine, Timeframe};

/// Creates a new agent and its matching zero-trade portfolio in one call —
/// the two rows are 1:1 and an agent with no portfolio row is not a state
/// the rest of the system is prepared to see.
pub fn spawn_agent(
    store: &Store,
    name: impl Into<String>,
    display_name: impl Into<String>,
    archetype: impl Into<String>,
    primary_timeframe: Timeframe,
    engine: Engine,
    source: AgentSource,
    initial_balance: f64,
    evolution_threshold: f64,
) -> Agent {
    let agent = Agent {
        id: Uuid::new_v4().to_string(),
        name: name.into(),
        display_name: display_name.into(),
        archetype: archetype.into(),
        primary_timeframe,
        engine,
        source,
        status: AgentStatus::Active,
        initial_balance,
        evolution_threshold,
    };
    store.upsert_agent(agent.clone());
    store.upsert_portfolio(new_portfolio(&agent.id, initial_balance));
    agent
}
