//! Forward synthesis.
//!
//! - the oracle contract (`oracle`)
//! - the analytic weak-field oracle shipped with the binary (`analytic`)
//! - topology-driven composition of oracle outputs (`evaluator`)
//! - reproducible observation noise (`noise`)

pub mod analytic;
pub mod evaluator;
pub mod noise;
pub mod oracle;

pub use analytic::AnalyticOracle;
pub use evaluator::{Conditions, evaluate, evaluate_all};
pub use oracle::{SynthesisContext, SynthesisOracle};
