//! Work units exchanged between coordinator and workers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Observation, ParamRef, StokesProfile};
use crate::fit::InversionResult;
use crate::synth::Conditions;

/// Smallest accepted `cos(theta)`; the limb itself has no slab solution.
const MIN_MU: f64 = 1e-3;

/// Everything a worker needs to process one pixel, besides the broadcast model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelTask {
    /// Position of the pixel in the original input.
    pub index: usize,
    /// Inactive (masked) pixels are skipped.
    pub active: bool,
    /// Line-of-sight angles `[theta, phi, gamma]` in degrees.
    pub los: Option<[f64; 3]>,
    pub boundary: Option<[f64; 4]>,
    /// Initial-guess overrides.
    pub initial: BTreeMap<ParamRef, f64>,
    pub observation: Option<Observation>,
}

impl PixelTask {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            active: true,
            los: None,
            boundary: None,
            initial: BTreeMap::new(),
            observation: None,
        }
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observation = Some(observation);
        self
    }

    /// Geometry and illumination for the forward model.
    pub fn conditions(&self) -> Result<Conditions, String> {
        let mu = match self.los {
            None => 1.0,
            Some([theta, _, _]) => theta.to_radians().cos(),
        };
        if !(mu >= MIN_MU && mu <= 1.0 + 1e-12) {
            return Err(format!("line of sight gives mu = {mu:.6}, expected [{MIN_MU}, 1]"));
        }
        if let Some(b) = self.boundary {
            if b.iter().any(|x| !x.is_finite()) {
                return Err(format!("boundary {b:?} is not finite"));
            }
        }
        Ok(Conditions {
            mu: mu.min(1.0),
            boundary: self.boundary,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Synthesis,
    InversionDiverged,
    InvalidTask,
    WorkerLost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Synthesis => "synthesis",
            FailureKind::InversionDiverged => "inversion_diverged",
            FailureKind::InvalidTask => "invalid_task",
            FailureKind::WorkerLost => "worker_lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PixelOutput {
    Synthesis { spectra: BTreeMap<String, StokesProfile> },
    Inversion(InversionResult),
    Skipped,
    Failed(PixelFailure),
}

impl PixelOutput {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        PixelOutput::Failed(PixelFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn status(&self) -> &'static str {
        match self {
            PixelOutput::Synthesis { .. } => "synthesis",
            PixelOutput::Inversion(_) => "inversion",
            PixelOutput::Skipped => "skipped",
            PixelOutput::Failed(_) => "failed",
        }
    }
}

/// One entry of the final, pixel-ordered result sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelRecord {
    pub pixel: usize,
    #[serde(flatten)]
    pub output: PixelOutput,
}
