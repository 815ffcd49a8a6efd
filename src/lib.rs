//! `stokes-fit` library crate.
//!
//! Synthesis and inversion of Stokes profiles emerging from stacks of model
//! atmospheres, pixel by pixel. The binary (`sfit`) is a thin wrapper around
//! this library so that:
//!
//! - core logic is testable without spawning processes
//! - the forward model and inversion engine can be driven from other tools

pub mod app;
pub mod cli;
pub mod config;
pub mod distribute;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod model;
pub mod report;
pub mod synth;
pub mod topology;
