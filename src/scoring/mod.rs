// =============================================================================
// Scorer — bullish score and confidence score over an indicator output set
// =============================================================================
//
// Two pure functions layered over `indicators::compute_all`'s output: a
// single directional number in [0, 1] and a trust-worthiness number in
// [0, 1]. Neither touches exchange or storage state.
// =============================================================================

pub mod confidence;
pub mod scorer;

pub use confidence::{confidence_score, volume_adequacy, ConfidenceBreakdown, VolumeContext};
pub use scorer::bullish_score;
