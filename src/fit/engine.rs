//! Per-pixel inversion: cycles in sequence, restarts in parallel.
//!
//! Every restart runs the full cycle sequence. Restart 0 starts from the
//! nominal (or overridden) values; restart `k > 0` perturbs each parameter the
//! first time a cycle activates it, with a generator seeded from
//! `(seed, pixel, k)`. The best restart is chosen by [`select_best`].

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{Observation, StokesProfile};
use crate::error::InversionError;
use crate::fit::lm::{CycleReport, CycleSpec, CycleStatus, run_cycle};
use crate::fit::objective::Objective;
use crate::fit::restart::{perturb, restart_seed};
use crate::fit::selection::{RestartOutcome, select_best};
use crate::model::{Model, ParameterSet, Slot};
use crate::synth::{Conditions, SynthesisOracle};

/// Best fit of one pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InversionResult {
    #[serde(skip)]
    pub pixel: usize,
    pub chi2: f64,
    /// Index of the winning restart (0 = nominal start).
    pub restart: usize,
    pub iterations: usize,
    /// `{atmosphere: {parameter: value}}`.
    pub parameters: BTreeMap<String, BTreeMap<String, f64>>,
    pub cycles: Vec<CycleReport>,
    /// Synthetic spectra at the best fit, per region.
    pub spectra: BTreeMap<String, StokesProfile>,
}

impl InversionResult {
    pub fn converged(&self) -> bool {
        self.cycles
            .last()
            .is_some_and(|c| c.status == CycleStatus::Converged)
    }
}

/// One pixel's inversion problem.
pub struct PixelProblem<'a> {
    pub pixel: usize,
    pub observation: &'a Observation,
    pub conditions: Conditions,
    pub start: ParameterSet,
}

pub fn invert(
    model: &Model,
    oracle: &dyn SynthesisOracle,
    problem: PixelProblem<'_>,
) -> Result<InversionResult, InversionError> {
    let settings = model.inversion();
    if settings.cycles.is_empty() {
        return Err(InversionError::InvalidTask("model has no inversion cycles".to_string()));
    }
    let objective = Objective::new(model, oracle, problem.observation, problem.conditions)?;
    let (active, fresh) = cycle_slots(model);

    let pixel = problem.pixel;
    let start = &problem.start;
    let outcomes: Vec<Result<RestartOutcome, InversionError>> = (0..=settings.random_restarts)
        .into_par_iter()
        .map(|restart| run_restart(&objective, start, &active, &fresh, pixel, restart))
        .collect();

    let best = select_best(outcomes)?;
    log::debug!(
        "pixel {pixel}: best restart {} of {} with chi2 {:.6e}",
        best.restart,
        settings.random_restarts + 1,
        best.chi2
    );

    let spectra = objective
        .spectra(&best.parameters)
        .map_err(|source| InversionError::Diverged {
            cycle: settings.cycles.len(),
            source,
        })?;

    Ok(InversionResult {
        pixel,
        chi2: best.chi2,
        restart: best.restart,
        iterations: best.iterations,
        parameters: best.parameters.to_named(model),
        cycles: best.cycles,
        spectra,
    })
}

/// Active slots per cycle, and the subset activated for the first time.
fn cycle_slots(model: &Model) -> (Vec<Vec<Slot>>, Vec<Vec<Slot>>) {
    let mut seen = std::collections::HashSet::new();
    let mut active = Vec::new();
    let mut fresh = Vec::new();
    for cycle in &model.inversion().cycles {
        let slots: Vec<Slot> = cycle.active.iter().filter_map(|p| model.resolve(p)).collect();
        fresh.push(slots.iter().copied().filter(|s| seen.insert(*s)).collect());
        active.push(slots);
    }
    (active, fresh)
}

fn run_restart(
    objective: &Objective<'_>,
    start: &ParameterSet,
    active: &[Vec<Slot>],
    fresh: &[Vec<Slot>],
    pixel: usize,
    restart: usize,
) -> Result<RestartOutcome, InversionError> {
    let model = objective.model();
    let settings = model.inversion();
    let mut rng = StdRng::seed_from_u64(restart_seed(settings.seed, pixel, restart));

    let mut parameters = start.clone();
    let mut chi2 = f64::INFINITY;
    let mut iterations = 0;
    let mut reports = Vec::with_capacity(settings.cycles.len());

    for (i, cycle) in settings.cycles.iter().enumerate() {
        if restart > 0 {
            perturb(model, &mut parameters, &fresh[i], &mut rng);
        }
        let spec = CycleSpec {
            number: i + 1,
            label: &cycle.label,
            active: &active[i],
            budget: settings.budget(i),
        };
        let outcome = run_cycle(objective, parameters, spec, &settings.lm)?;
        log::trace!(
            "pixel {pixel} restart {restart} cycle {}: {:?} after {} iterations, chi2 {:.6e}",
            i + 1,
            outcome.report.status,
            outcome.report.iterations,
            outcome.chi2
        );
        parameters = outcome.parameters;
        chi2 = outcome.chi2;
        iterations += outcome.report.iterations;
        reports.push(outcome.report);
    }

    Ok(RestartOutcome {
        restart,
        parameters,
        chi2,
        iterations,
        cycles: reports,
    })
}
