// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// One variant per failure category described for the pipeline, the exchange
// client, and the agent orchestrator. Call sites match on category rather
// than parsing strings; the pipeline runner and the orchestrator are the two
// places that catch every variant at their own boundary and convert it into
// a persisted status field instead of letting it unwind further.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// 5xx, timeout, or malformed payload from the exchange. Retried with
    /// exponential backoff before this is raised; the containing symbol is
    /// dropped from the run, not the whole run.
    #[error("exchange error ({status}): {message}")]
    Exchange { status: u16, message: String },

    /// 429 or equivalent. Honored via retry-after; escalates to `Exchange`
    /// if the wait budget is exhausted.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// Fewer than 50 candles, or insufficient history for a given indicator.
    /// Not a failure — the symbol is skipped.
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    /// An action is infeasible (cap reached, no cash, no matching open
    /// position). Logged as a decision with a failed execution result.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Reconciliation discrepancy exceeding the $0.01 tolerance.
    #[error("portfolio invariant violated: {discrepancy:.4} over tolerance")]
    PortfolioInvariant { discrepancy: f64 },

    /// Exception raised inside a strategy's `evaluate`. Caught at the
    /// orchestrator boundary and converted to a `hold` with confidence 0.
    #[error("strategy error: {reason}")]
    Strategy { reason: String },

    /// Any uncaught exception during a pipeline run. The run is marked
    /// `failed`; the lock is still released.
    #[error("pipeline error: {reason}")]
    Pipeline { reason: String },

    /// Timeout or connection failure for an `engine=llm` agent.
    #[error("llm error: {reason}")]
    Llm { reason: String },
}
