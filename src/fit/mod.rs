//! Inversion engine.
//!
//! Responsibilities:
//!
//! - turn observations into weighted residuals ([`objective`])
//! - run Levenberg–Marquardt cycles over the active parameters ([`lm`])
//! - run perturbed restarts in parallel and keep the best ([`engine`])

pub mod engine;
pub mod lm;
pub mod objective;
pub mod restart;
pub mod selection;
pub mod settings;

pub use engine::{InversionResult, PixelProblem, invert};
pub use lm::{CycleReport, CycleStatus};
pub use objective::Objective;
pub use selection::{RestartOutcome, select_best};
pub use settings::{Cycle, InversionSettings, LmSettings};
