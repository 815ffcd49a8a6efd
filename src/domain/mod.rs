//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`WorkingMode`, `AtmosphereKind`)
//! - the sampled Stokes vector (`StokesProfile`)
//! - parameter references (`ParamRef`, written `atmosphere.parameter`)
//! - per-pixel observed data (`Observation`, `Sigma`)

pub mod observation;
pub mod types;

pub use observation::*;
pub use types::*;
