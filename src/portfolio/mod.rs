// =============================================================================
// Portfolio & Position Manager (C8)
// =============================================================================

pub mod manager;
pub mod position;

pub use manager::{new_portfolio, ExecutionResult, PortfolioManager, ReconcileReport, ValidationResult};
