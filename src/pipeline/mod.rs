// =============================================================================
// Pipeline Runner (C6) & Regime Classifier (C7)
// =============================================================================

pub mod regime;
pub mod runner;

pub use regime::compute_regime;
pub use runner::{run_pipeline, PipelineRunSummary, SymbolBar};
