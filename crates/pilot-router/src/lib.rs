//! Signal router.
//!
//! The gatekeeper between the outside world and the position manager:
//! validates canonical signals, applies the symbol whitelist and the
//! open gates, fans multi-symbol signals out, and dispatches to the
//! manager. The router never mutates position state directly.

pub mod router;

pub use router::{RouterConfig, SignalResponse, SignalRouter};
