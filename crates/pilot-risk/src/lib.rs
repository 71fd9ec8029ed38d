//! Risk rules for the pilot trading executor.
//!
//! Two halves:
//! - `evaluator`: a pure function deciding hold/close/partial-close for a
//!   live position against a fresh mark price
//! - `gates`: stateful checks that guard `open` signals (cooling period,
//!   daily trade cap, daily loss cap, concurrent position cap)

pub mod evaluator;
pub mod gates;

pub use evaluator::{evaluate, EvaluatorConfig, ExitDecision, PriceSample};
pub use gates::{GateResult, RiskGateConfig, RiskGates};
