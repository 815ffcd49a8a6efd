//! Mathematical utilities: line profiles and least squares.

pub mod ols;
pub mod profile;

pub use ols::*;
pub use profile::*;
