//! Shared run pipeline used by the `synth` and `invert` commands.
//!
//! config -> sealed model -> pixel tasks -> distributor -> ordered records
//!
//! The commands only differ in where tasks come from and which files are
//! written afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DistributionOverrides, RunConfig, WORKERS_ENV};
use crate::distribute::{Distribution, PixelRecord, PixelTask, run_all_pixels};
use crate::domain::WorkingMode;
use crate::error::AppError;
use crate::io::ObservationFile;
use crate::model::Model;
use crate::synth::AnalyticOracle;

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub model: Arc<Model>,
    pub distribution: Distribution,
    pub tasks: Vec<PixelTask>,
    pub records: Vec<PixelRecord>,
    pub elapsed: Duration,
}

/// Seal the model, resolve the worker setup and process every pixel.
///
/// `command` is the mode the invoking command works in; a config declaring the
/// other mode is rejected before anything runs.
pub fn run_pixels(
    config: &RunConfig,
    command: WorkingMode,
    tasks: Vec<PixelTask>,
    overrides: DistributionOverrides,
) -> Result<RunOutput, AppError> {
    if config.mode != command {
        return Err(AppError::new(
            2,
            format!("configuration declares {:?} mode but the command runs {command:?}", config.mode),
        ));
    }

    let model = Arc::new(config.build_model()?);
    let env_workers = std::env::var(WORKERS_ENV).ok();
    let distribution = config.distribution.resolve(overrides, env_workers.as_deref())?;
    log::info!(
        "{:?} run: {} pixels, {} regions, {} atmospheres ({distribution:?})",
        command,
        tasks.len(),
        model.regions().len(),
        model.atmospheres().len()
    );

    let started = Instant::now();
    let records = run_all_pixels(Arc::clone(&model), &AnalyticOracle, tasks.clone(), distribution)?;
    Ok(RunOutput {
        model,
        distribution,
        tasks,
        records,
        elapsed: started.elapsed(),
    })
}

/// `count` default pixels: disk center, no overrides.
pub fn default_tasks(count: usize) -> Vec<PixelTask> {
    (0..count).map(PixelTask::new).collect()
}

/// Observation file built from a synthesis run, with optional noise.
pub fn synthetic_observations(run: &RunOutput, noise: f64, seed: u64) -> ObservationFile {
    let mut file = ObservationFile::from_synthesis(&run.tasks, &run.records, noise);
    if noise > 0.0 {
        for entry in &mut file.pixels {
            crate::synth::noise::add_noise(&mut entry.stokes, noise, seed, entry.index);
        }
    }
    file
}

/// Apply `--restarts` / `--seed` before the model is sealed.
pub fn apply_inversion_overrides(config: &mut RunConfig, restarts: Option<usize>, seed: Option<u64>) {
    if let Some(restarts) = restarts {
        config.inversion.random_restarts = restarts;
    }
    if let Some(seed) = seed {
        config.inversion.seed = seed;
    }
}
