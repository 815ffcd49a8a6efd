//! Input/output helpers.
//!
//! - observation files (`observations`)
//! - result JSON (`results`)
//! - per-pixel CSV summary (`export`)

pub mod export;
pub mod observations;
pub mod results;

pub use export::*;
pub use observations::*;
pub use results::*;
