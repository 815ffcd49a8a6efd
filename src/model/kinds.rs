//! Parameter layouts per atmosphere kind.
//!
//! The layout is fixed by the kind: the analytic oracle looks parameters up by
//! name, and the config layer only ever overrides values and bounds.

use serde::{Deserialize, Serialize};

use crate::domain::AtmosphereKind;
use crate::model::atmosphere::Parameter;

/// Photosphere: `eta0, width, v, Bx, By, Bz, source, ff`.
pub const PHOTOSPHERE: [&str; 8] = ["eta0", "width", "v", "Bx", "By", "Bz", "source", "ff"];

/// Chromosphere: `Bx, By, Bz, tau, v, deltav, beta, a, ff`.
pub const CHROMOSPHERE: [&str; 9] = ["Bx", "By", "Bz", "tau", "v", "deltav", "beta", "a", "ff"];

/// Parametric profile: `lambda0, sigma, depth, a, ff`.
pub const PARAMETRIC: [&str; 5] = ["lambda0", "sigma", "depth", "a", "ff"];

pub fn parameter_names(kind: AtmosphereKind) -> &'static [&'static str] {
    match kind {
        AtmosphereKind::Photosphere => &PHOTOSPHERE,
        AtmosphereKind::Chromosphere => &CHROMOSPHERE,
        AtmosphereKind::Parametric => &PARAMETRIC,
    }
}

/// Chromospheric starting points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromospherePreset {
    #[default]
    Disk,
    OffLimb,
}

impl ChromospherePreset {
    pub fn deltav(self) -> f64 {
        match self {
            ChromospherePreset::Disk => 8.0,
            ChromospherePreset::OffLimb => 14.0,
        }
    }
}

/// Default parameters of a kind.
///
/// `line_center` (Å) anchors the parametric `lambda0` and its bounds.
pub fn default_parameters(kind: AtmosphereKind, line_center: f64, preset: ChromospherePreset) -> Vec<Parameter> {
    match kind {
        AtmosphereKind::Photosphere => vec![
            Parameter::new("eta0", 5.0, 0.0, 100.0, 1.0),
            Parameter::new("width", 0.1, 0.005, 2.0, 0.02),
            Parameter::new("v", 0.0, -50.0, 50.0, 1.0),
            Parameter::new("Bx", 0.0, -4000.0, 4000.0, 100.0),
            Parameter::new("By", 0.0, -4000.0, 4000.0, 100.0),
            Parameter::new("Bz", 0.0, -4000.0, 4000.0, 100.0),
            Parameter::new("source", 0.3, 0.0, 2.0, 0.05),
            Parameter::new("ff", 1.0, 0.0, 1.0, 0.0),
        ],
        AtmosphereKind::Chromosphere => vec![
            Parameter::new("Bx", 0.0, -1000.0, 1000.0, 50.0),
            Parameter::new("By", 0.0, -1000.0, 1000.0, 50.0),
            Parameter::new("Bz", 0.0, -1000.0, 1000.0, 50.0),
            Parameter::new("tau", 1.0, 0.0, 20.0, 0.2),
            Parameter::new("v", 0.0, -50.0, 50.0, 1.0),
            Parameter::new("deltav", preset.deltav(), 1.0, 30.0, 1.0),
            Parameter::new("beta", 1.0, 0.5, 5.0, 0.1),
            Parameter::new("a", 0.0, 0.0, 1.0, 0.05),
            Parameter::new("ff", 1.0, 0.0, 1.0, 0.0),
        ],
        AtmosphereKind::Parametric => vec![
            Parameter::new("lambda0", line_center, line_center - 2.0, line_center + 2.0, 0.01),
            Parameter::new("sigma", 0.1, 0.001, 2.0, 0.02),
            Parameter::new("depth", 0.5, -1.0, 1.0, 0.05),
            Parameter::new("a", 0.0, 0.0, 1.0, 0.05),
            Parameter::new("ff", 1.0, 0.0, 1.0, 0.0),
        ],
    }
}
