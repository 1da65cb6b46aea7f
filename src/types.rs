// =============================================================================
// Shared types used across the trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Bar interval a pipeline run, snapshot, or agent operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Scheduler cadence in minutes between pipeline runs.
    pub fn cadence_minutes(self) -> u32 {
        match self {
            Timeframe::M15 => 5,
            Timeframe::M30 => 10,
            Timeframe::H1 => 15,
            Timeframe::H4 => 60,
            Timeframe::D1 => 240,
            Timeframe::W1 => 1440,
        }
    }

    /// Candle window fetched per pipeline run (always enough for EMA200).
    pub fn candle_window(self) -> usize {
        200
    }

    /// Bar duration in milliseconds — used to pad a historical candle fetch
    /// with enough lead-in bars for indicator warmup.
    pub fn bar_duration_ms(self) -> i64 {
        match self {
            Timeframe::M15 => 15 * 60_000,
            Timeframe::M30 => 30 * 60_000,
            Timeframe::H1 => 60 * 60_000,
            Timeframe::H4 => 4 * 60 * 60_000,
            Timeframe::D1 => 24 * 60 * 60_000,
            Timeframe::W1 => 7 * 24 * 60 * 60_000,
        }
    }

    /// Binance-style interval string used by the exchange client.
    pub fn interval_str(self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.interval_str())
    }
}

/// Long or short position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Status of a `ComputationRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Status of a `BacktestRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Lifecycle status of an `Agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
    Discarded,
}

/// Decision engine backing an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Rule,
    Llm,
}

/// Context source an agent's strategy draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    Technical,
    Tweet,
    Hybrid,
}

/// Reason a position was closed, producing an `AgentTrade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    AgentDecision,
    BacktestEnd,
    AgentPaused,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::AgentDecision => "agent_decision",
            ExitReason::BacktestEnd => "backtest_end",
            ExitReason::AgentPaused => "agent_paused",
        };
        write!(f, "{s}")
    }
}

/// Coarse market regime label derived per timeframe from the latest
/// pipeline run's aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingBull,
    TrendingBear,
    Ranging,
    Volatile,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::TrendingBull => "trending_bull",
            Regime::TrendingBear => "trending_bear",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
        };
        write!(f, "{s}")
    }
}

/// The action a strategy decides on for one agent cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    OpenLong,
    OpenShort,
    Close,
    Hold,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::OpenLong => "open_long",
            ActionKind::OpenShort => "open_short",
            ActionKind::Close => "close",
            ActionKind::Hold => "hold",
        };
        write!(f, "{s}")
    }
}

/// A strategy's output for one cycle: a pure value, no portfolio mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAction {
    pub action: ActionKind,
    pub symbol: Option<String>,
    pub size_pct: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub confidence: f64,
    pub reasoning: String,
}

impl TradeAction {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: ActionKind::Hold,
            symbol: None,
            size_pct: 0.0,
            sl_pct: 0.0,
            tp_pct: 0.0,
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadences_match_spec_table() {
        assert_eq!(Timeframe::M15.cadence_minutes(), 5);
        assert_eq!(Timeframe::M30.cadence_minutes(), 10);
        assert_eq!(Timeframe::H1.cadence_minutes(), 15);
        assert_eq!(Timeframe::H4.cadence_minutes(), 60);
        assert_eq!(Timeframe::D1.cadence_minutes(), 240);
        assert_eq!(Timeframe::W1.cadence_minutes(), 1440);
    }

    #[test]
    fn bar_duration_ms_matches_interval() {
        assert_eq!(Timeframe::H1.bar_duration_ms(), 3_600_000);
        assert_eq!(Timeframe::M15.bar_duration_ms(), 900_000);
    }

    #[test]
    fn display_matches_interval_str() {
        assert_eq!(Timeframe::H1.to_string(), "1h");
        assert_eq!(Timeframe::W1.to_string(), "1w");
    }

    #[test]
    fn exit_reason_display_is_snake_case() {
        assert_eq!(ExitReason::BacktestEnd.to_string(), "backtest_end");
        assert_eq!(ExitReason::StopLoss.to_string(), "stop_loss");
    }

    #[test]
    fn hold_action_has_zero_confidence_and_no_symbol() {
        let action = TradeAction::hold("nothing to do");
        assert_eq!(action.action, ActionKind::Hold);
        assert!(action.symbol.is_none());
        assert_eq!(action.confidence, 0.0);
    }

    #[test]
    fn action_kind_display_matches_wire_format() {
        assert_eq!(ActionKind::OpenLong.to_string(), "open_long");
        assert_eq!(ActionKind::Close.to_string(), "close");
    }
}
