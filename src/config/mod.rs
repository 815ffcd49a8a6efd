//! Run configuration (JSON).
//!
//! Every struct rejects unknown keys. The configuration only describes the run;
//! [`RunConfig::build_model`] turns it into a sealed, validated [`Model`].
//!
//! ```json
//! {
//!   "mode": "inversion",
//!   "atmospheres": [
//!     {"kind": "photosphere", "name": "ph1"},
//!     {"kind": "chromosphere", "name": "ch1", "parameters": {"Bz": {"value": 50, "perturbation": 20}}}
//!   ],
//!   "regions": [
//!     {"name": "He", "wavelength": {"min": 10826, "max": 10833, "n": 141},
//!      "topology": "ph1 -> ch1", "line": {"center": 10830.3, "lande": 1.25}}
//!   ],
//!   "inversion": {"cycles": [{"active": ["ch1.Bz", "ch1.tau"]}], "random_restarts": 2},
//!   "distribution": {"mode": "distributed", "workers": 4}
//! }
//! ```

pub mod atmosphere;

use std::path::Path;
use std::thread;

use serde::Deserialize;

use crate::distribute::Distribution;
use crate::domain::WorkingMode;
use crate::error::{ConfigError, ModelError};
use crate::fit::{Cycle, InversionSettings, LmSettings};
use crate::model::{Model, ModelBuilder, RegionSpec, SpectralLine, Weights, linear_grid};

pub use atmosphere::{AtmosphereConfig, ParameterSpec};

/// Environment variable holding the default worker count.
pub const WORKERS_ENV: &str = "SFIT_WORKERS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub mode: WorkingMode,
    pub atmospheres: Vec<AtmosphereConfig>,
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub inversion: InversionConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

/// Wavelength grid: evenly spaced, or listed sample by sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GridConfig {
    Range(GridRange),
    Explicit(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridRange {
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl GridConfig {
    pub fn samples(&self) -> Vec<f64> {
        match self {
            GridConfig::Range(r) => linear_grid(r.min, r.max, r.n),
            GridConfig::Explicit(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub name: String,
    pub wavelength: GridConfig,
    pub topology: String,
    pub line: SpectralLine,
    /// Fit weights for I, Q, U, V, or full per-sample profiles.
    #[serde(default)]
    pub weights: Weights,
    #[serde(default = "default_boundary")]
    pub boundary: [f64; 4],
}

fn default_boundary() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InversionConfig {
    pub cycles: Vec<Cycle>,
    pub random_restarts: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub patience: usize,
    pub chi2_floor: f64,
    pub lambda_init: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub lambda_max: f64,
    pub fd_step: f64,
}

impl Default for InversionConfig {
    fn default() -> Self {
        let settings = InversionSettings::default();
        let lm = settings.lm;
        Self {
            cycles: settings.cycles,
            random_restarts: settings.random_restarts,
            seed: settings.seed,
            max_iterations: lm.max_iterations,
            tolerance: lm.tolerance,
            patience: lm.patience,
            chi2_floor: lm.chi2_floor,
            lambda_init: lm.lambda_init,
            lambda_up: lm.lambda_up,
            lambda_down: lm.lambda_down,
            lambda_max: lm.lambda_max,
            fd_step: lm.fd_step,
        }
    }
}

impl InversionConfig {
    pub fn to_settings(&self) -> InversionSettings {
        InversionSettings {
            cycles: self.cycles.clone(),
            random_restarts: self.random_restarts,
            seed: self.seed,
            lm: LmSettings {
                max_iterations: self.max_iterations,
                tolerance: self.tolerance,
                patience: self.patience,
                chi2_floor: self.chi2_floor,
                lambda_init: self.lambda_init,
                lambda_up: self.lambda_up,
                lambda_down: self.lambda_down,
                lambda_max: self.lambda_max,
                fd_step: self.fd_step,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    Serial,
    #[default]
    Distributed,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributionConfig {
    pub mode: DistributionMode,
    pub workers: Option<usize>,
}

/// Command-line overrides of the distribution settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionOverrides {
    pub serial: bool,
    pub workers: Option<usize>,
}

impl DistributionConfig {
    /// Resolve the worker setup.
    ///
    /// Precedence: command line, config file, `env_workers` (the value of
    /// [`WORKERS_ENV`]), then the available parallelism.
    pub fn resolve(
        &self,
        overrides: DistributionOverrides,
        env_workers: Option<&str>,
    ) -> Result<Distribution, ConfigError> {
        if overrides.serial || (self.mode == DistributionMode::Serial && overrides.workers.is_none()) {
            return Ok(Distribution::Serial);
        }
        // The environment is only consulted (and parsed) when nothing above it is set.
        let workers = match overrides.workers.or(self.workers) {
            Some(workers) => workers,
            None => match env_workers {
                Some(raw) => raw.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
                    field: WORKERS_ENV.to_string(),
                    detail: format!("'{raw}' is not a worker count"),
                })?,
                None => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            },
        };
        if workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers".to_string(),
                detail: "must be > 0".to_string(),
            });
        }
        Ok(Distribution::Distributed { workers })
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Assemble and seal the model.
    pub fn build_model(&self) -> Result<Model, ModelError> {
        let mut builder = ModelBuilder::new(self.mode).inversion(self.inversion.to_settings());
        for atmosphere in &self.atmospheres {
            builder = builder.atmosphere(atmosphere.to_atmosphere(self.line_center_for(atmosphere)));
        }
        for region in &self.regions {
            let mut spec = RegionSpec::new(&region.name, region.wavelength.samples(), &region.topology, region.line);
            spec.weights = region.weights.clone();
            spec.boundary = region.boundary;
            builder = builder.region(spec);
        }
        builder.seal()
    }

    /// Line center of the first region the atmosphere is scoped to.
    fn line_center_for(&self, atmosphere: &AtmosphereConfig) -> f64 {
        let scoped = atmosphere
            .regions()
            .first()
            .and_then(|name| self.regions.iter().find(|r| &r.name == name));
        scoped
            .or_else(|| self.regions.first())
            .map(|r| r.line.center)
            .unwrap_or(0.0)
    }
}
