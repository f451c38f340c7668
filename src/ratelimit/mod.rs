//! Per-client request rate limiting and state management.

mod gate;
mod identity;
mod sweeper;
mod window;

pub use gate::{Decision, RateLimitGate, RateLimitSettings};
pub use identity::{ClientIdentity, FALLBACK_IDENTITY};
pub use sweeper::Sweeper;
