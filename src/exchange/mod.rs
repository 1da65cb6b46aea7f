// =============================================================================
// Exchange — read-only public market data access (C1)
// =============================================================================

pub mod client;
pub mod rate_limit;

pub use client::{ExchangeClient, Symbol};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
