//! One inversion cycle: damped Gauss-Newton (Levenberg–Marquardt) iterations.
//!
//! State machine per cycle:
//!
//! ```text
//! INITIALIZED -> ITERATING -> CONVERGED | MAX_ITERS_REACHED | DIVERGED
//! ```
//!
//! Each iteration:
//! - build the finite-difference Jacobian of the residuals over the active
//!   parameters (columns in parallel), unless the last step was rejected and
//!   the previous Jacobian is complete
//! - solve the damped system for a step, clip the trial point to bounds
//! - accept iff chi-square strictly decreases (damping shrinks), otherwise
//!   reject (damping grows)
//!
//! A synthesis failure at a trial point is a rejected step. The accepted point is
//! then re-evaluated; if that fails too the cycle aborts with
//! [`InversionError::Diverged`].

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::InversionError;
use crate::fit::objective::Objective;
use crate::fit::settings::LmSettings;
use crate::math::{column_scale, solve_damped};
use crate::model::{ParameterSet, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Initialized,
    Iterating,
    Converged,
    MaxItersReached,
    Diverged,
}

impl CycleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CycleStatus::Converged | CycleStatus::MaxItersReached | CycleStatus::Diverged
        )
    }
}

/// Convergence record of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: usize,
    pub label: String,
    pub status: CycleStatus,
    pub iterations: usize,
    /// Chi-square at the start and after every accepted step.
    pub chi2_history: Vec<f64>,
    pub lambda: f64,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub parameters: ParameterSet,
    pub chi2: f64,
    pub report: CycleReport,
}

/// Identifies the cycle being run.
#[derive(Debug, Clone, Copy)]
pub struct CycleSpec<'a> {
    pub number: usize,
    pub label: &'a str,
    pub active: &'a [Slot],
    pub budget: usize,
}

pub fn run_cycle(
    objective: &Objective<'_>,
    start: ParameterSet,
    cycle: CycleSpec<'_>,
    lm: &LmSettings,
) -> Result<CycleOutcome, InversionError> {
    let diverged = |source| InversionError::Diverged {
        cycle: cycle.number,
        source,
    };

    let mut status = CycleStatus::Initialized;
    let mut current = start;
    let mut r = objective.residuals(&current).map_err(diverged)?;
    let mut chi2 = objective.chi2(&r);
    let mut lambda = lm.lambda_init;
    let mut history = vec![chi2];
    let mut iterations = 0;
    let mut stalls = 0;
    let mut accepted_any = false;
    let mut jacobian: Option<DMatrix<f64>> = None;

    status = transition(status, CycleStatus::Iterating);
    while !status.is_terminal() {
        if chi2 <= lm.chi2_floor {
            status = transition(status, CycleStatus::Converged);
            break;
        }
        if iterations >= cycle.budget {
            status = transition(status, CycleStatus::MaxItersReached);
            break;
        }
        iterations += 1;

        let (j, complete) = match jacobian.take() {
            Some(j) => (j, true),
            None => finite_difference_jacobian(objective, &current, &r, cycle.active, lm.fd_step),
        };
        if !complete {
            log::trace!("cycle {}: incomplete Jacobian at iteration {iterations}", cycle.number);
        }

        let trial = solve_damped(&j, &r, lambda, &column_scale(&j)).map(|delta| clip_step(objective, &current, cycle.active, &delta));

        let outcome = match trial {
            None => TrialOutcome::Unsolvable,
            Some(trial) => match objective.residuals(&trial) {
                Ok(r_trial) => {
                    let chi2_trial = objective.chi2(&r_trial);
                    if chi2_trial < chi2 {
                        TrialOutcome::Better(trial, r_trial, chi2_trial)
                    } else {
                        TrialOutcome::NotBetter(chi2_trial)
                    }
                }
                Err(err) => TrialOutcome::Failed(err),
            },
        };

        match outcome {
            TrialOutcome::Better(trial, r_trial, chi2_trial) => {
                let improvement = (chi2 - chi2_trial) / chi2.max(f64::MIN_POSITIVE);
                log::trace!(
                    "cycle {} iter {iterations}: accepted chi2 {chi2:.6e} -> {chi2_trial:.6e} (lambda {lambda:.1e})",
                    cycle.number
                );
                current = trial;
                r = r_trial;
                chi2 = chi2_trial;
                history.push(chi2);
                accepted_any = true;
                lambda = (lambda * lm.lambda_down).max(f64::MIN_POSITIVE);

                if improvement < lm.tolerance {
                    stalls += 1;
                    if stalls >= lm.patience {
                        status = transition(status, CycleStatus::Converged);
                    }
                } else {
                    stalls = 0;
                }
                continue;
            }
            TrialOutcome::NotBetter(chi2_trial) => {
                log::trace!(
                    "cycle {} iter {iterations}: rejected chi2 {chi2_trial:.6e} >= {chi2:.6e} (lambda {lambda:.1e})",
                    cycle.number
                );
            }
            TrialOutcome::Unsolvable => {
                log::trace!("cycle {} iter {iterations}: damped system unsolvable", cycle.number);
            }
            TrialOutcome::Failed(err) => {
                log::trace!("cycle {} iter {iterations}: trial point failed: {err}", cycle.number);
                // The accepted point must still be computable.
                objective.residuals(&current).map_err(diverged)?;
            }
        }

        // Rejected: keep a complete Jacobian for the next, more damped, attempt.
        if complete {
            jacobian = Some(j);
        }
        lambda *= lm.lambda_up;
        if lambda > lm.lambda_max {
            let end = if accepted_any {
                CycleStatus::Converged
            } else {
                CycleStatus::Diverged
            };
            status = transition(status, end);
        }
    }

    Ok(CycleOutcome {
        parameters: current,
        chi2,
        report: CycleReport {
            cycle: cycle.number,
            label: cycle.label.to_string(),
            status,
            iterations,
            chi2_history: history,
            lambda,
        },
    })
}

enum TrialOutcome {
    Better(ParameterSet, DVector<f64>, f64),
    NotBetter(f64),
    Unsolvable,
    Failed(crate::error::SynthesisError),
}

fn transition(from: CycleStatus, to: CycleStatus) -> CycleStatus {
    debug_assert!(!from.is_terminal(), "cycle already finished with {from:?}");
    to
}

/// Columns that fail to evaluate are left at zero; the flag reports whether
/// every column succeeded.
fn finite_difference_jacobian(
    objective: &Objective<'_>,
    at: &ParameterSet,
    r0: &DVector<f64>,
    active: &[Slot],
    fd_step: f64,
) -> (DMatrix<f64>, bool) {
    let model = objective.model();
    let columns: Vec<Option<DVector<f64>>> = active
        .par_iter()
        .map(|&slot| {
            let p = model.parameter(slot);
            let range = p.max - p.min;
            if range <= 0.0 {
                return Some(DVector::zeros(r0.len()));
            }
            // fd_step <= 0.5 guarantees one of x ± h lies inside the bounds.
            let x = at.get(slot);
            let mut h = fd_step * range;
            if x + h > p.max {
                h = -h;
            }
            let mut shifted = at.clone();
            shifted.set(slot, x + h);
            objective.residuals(&shifted).ok().map(|r| (r - r0) / h)
        })
        .collect();

    let mut j = DMatrix::zeros(r0.len(), active.len());
    let mut complete = true;
    for (k, column) in columns.into_iter().enumerate() {
        match column {
            Some(c) => j.set_column(k, &c),
            None => complete = false,
        }
    }
    (j, complete)
}

fn clip_step(objective: &Objective<'_>, current: &ParameterSet, active: &[Slot], delta: &DVector<f64>) -> ParameterSet {
    let model = objective.model();
    let mut trial = current.clone();
    for (k, &slot) in active.iter().enumerate() {
        let value = model.parameter(slot).clamp(current.get(slot) + delta[k]);
        trial.set(slot, value);
    }
    trial
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::{AtmosphereKind, Observation, Sigma, StokesProfile, WorkingMode};
    use crate::error::SynthesisError;
    use crate::model::tests::{atmosphere, region};
    use crate::model::{AtmosphereRef, Model, ModelBuilder};
    use crate::synth::{AnalyticOracle, Conditions, SynthesisContext, SynthesisOracle, evaluate_all};

    /// Wraps the analytic oracle and fails on selected call numbers (1-based).
    pub(crate) struct FlakyOracle {
        calls: AtomicUsize,
        fail: fn(usize) -> bool,
    }

    impl FlakyOracle {
        pub(crate) fn new(fail: fn(usize) -> bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SynthesisOracle for FlakyOracle {
        fn synthesize(
            &self,
            atmosphere: &AtmosphereRef<'_>,
            context: &SynthesisContext<'_>,
        ) -> Result<StokesProfile, SynthesisError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if (self.fail)(call) {
                return Err(SynthesisError::NumericalDivergence {
                    atmosphere: atmosphere.name().to_string(),
                    detail: format!("injected failure on call {call}"),
                    values: atmosphere.values.to_vec(),
                });
            }
            AnalyticOracle.synthesize(atmosphere, context)
        }
    }

    pub(crate) fn telluric_model() -> Model {
        ModelBuilder::new(WorkingMode::Synthesis)
            .atmosphere(atmosphere("te1", AtmosphereKind::Parametric))
            .region(region("He", "te1"))
            .seal()
            .unwrap()
    }

    /// Observation synthesized with `depth = 0.3`, `sigma = 0.12`, plus a fixed ripple.
    pub(crate) fn telluric_observation(model: &Model) -> Observation {
        let mut truth = ParameterSet::nominal(model);
        truth.set(slot(model, "te1.depth"), 0.3);
        truth.set(slot(model, "te1.sigma"), 0.12);
        let mut stokes = evaluate_all(model, &AnalyticOracle, &truth, &Conditions::default()).unwrap();
        for (k, x) in stokes.get_mut("He").unwrap().i.iter_mut().enumerate() {
            *x += 1e-3 * ((k * 7 % 5) as f64 - 2.0);
        }
        Observation {
            stokes,
            sigma: Sigma::Scalar(1e-3),
        }
    }

    pub(crate) fn slot(model: &Model, name: &str) -> Slot {
        model.resolve(&name.parse().unwrap()).unwrap()
    }

    fn spec<'a>(active: &'a [Slot], budget: usize) -> CycleSpec<'a> {
        CycleSpec {
            number: 1,
            label: "test",
            active,
            budget,
        }
    }

    #[test]
    fn accepted_chi2_is_non_increasing_and_improves() {
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &AnalyticOracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.depth"), slot(&model, "te1.sigma")];

        let out = run_cycle(&objective, ParameterSet::nominal(&model), spec(&active, 50), &LmSettings::default()).unwrap();
        let h = &out.report.chi2_history;
        assert!(h.windows(2).all(|w| w[1] < w[0]));
        assert!(out.chi2 < h[0] * 1e-2);
        assert!((out.parameters.get(active[0]) - 0.3).abs() < 1e-2);
        assert!(out.report.status.is_terminal());
        assert_ne!(out.report.status, CycleStatus::Diverged);
    }

    #[test]
    fn budget_exhaustion_reports_max_iters() {
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &AnalyticOracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.sigma")];

        let out = run_cycle(&objective, ParameterSet::nominal(&model), spec(&active, 1), &LmSettings::default()).unwrap();
        assert_eq!(out.report.iterations, 1);
        assert_eq!(out.report.status, CycleStatus::MaxItersReached);
    }

    #[test]
    fn inactive_parameters_never_move() {
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &AnalyticOracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.depth")];
        let start = ParameterSet::nominal(&model);

        let out = run_cycle(&objective, start.clone(), spec(&active, 20), &LmSettings::default()).unwrap();
        for name in ["te1.sigma", "te1.lambda0", "te1.a", "te1.ff"] {
            let s = slot(&model, name);
            assert_eq!(out.parameters.get(s), start.get(s), "{name} moved");
        }
    }

    #[test]
    fn failing_trial_is_rejected_not_fatal() {
        // Calls: 1 = initial point, 2 = Jacobian, 3 = first trial, 4 = Jacobian,
        // 5 = second trial, 6 = Jacobian or trial. Fail one late call only.
        let oracle = FlakyOracle::new(|call| call == 7);
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &oracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.depth")];
        let lm = LmSettings {
            chi2_floor: 0.0,
            tolerance: 1e-12,
            ..LmSettings::default()
        };

        let out = run_cycle(&objective, ParameterSet::nominal(&model), spec(&active, 6), &lm).unwrap();
        assert!(oracle.calls() >= 7);
        assert!(matches!(
            out.report.status,
            CycleStatus::Converged | CycleStatus::MaxItersReached
        ));
        assert!(out.report.chi2_history.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn failure_at_accepted_point_diverges() {
        // The initial point and Jacobian succeed, everything afterwards fails.
        let oracle = FlakyOracle::new(|call| call >= 3);
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &oracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.depth")];

        let err = run_cycle(&objective, ParameterSet::nominal(&model), spec(&active, 10), &LmSettings::default()).unwrap_err();
        assert!(matches!(err, InversionError::Diverged { cycle: 1, .. }));
    }

    #[test]
    fn hopeless_start_diverges_without_error() {
        // A parameter with no influence on the spectrum: every step is rejected.
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let objective = Objective::new(&model, &AnalyticOracle, &obs, Conditions::default()).unwrap();
        let active = [slot(&model, "te1.sigma")];
        let mut start = ParameterSet::nominal(&model);
        start.set(slot(&model, "te1.depth"), 0.0);

        let out = run_cycle(&objective, start.clone(), spec(&active, 100), &LmSettings::default()).unwrap();
        assert_eq!(out.report.status, CycleStatus::Diverged);
        assert_eq!(out.report.chi2_history.len(), 1);
        assert_eq!(out.parameters, start);
    }

    #[test]
    fn rejected_trials_leave_accepted_point_unchanged() {
        // One active parameter: call 1 = initial point, 2 = Jacobian, then every
        // trial (odd calls) fails and is followed by a re-evaluation of the
        // accepted point (even calls). The Jacobian is reused after a rejection.
        let model = telluric_model();
        let obs = telluric_observation(&model);
        let active = [slot(&model, "te1.depth")];
        let start = ParameterSet::nominal(&model);
        let initial = {
            let objective = Objective::new(&model, &AnalyticOracle, &obs, Conditions::default()).unwrap();
            objective.chi2(&objective.residuals(&start).unwrap())
        };

        for budget in 1..=5 {
            let oracle = FlakyOracle::new(|call| call >= 3 && call % 2 == 1);
            let objective = Objective::new(&model, &oracle, &obs, Conditions::default()).unwrap();
            let out = run_cycle(&objective, start.clone(), spec(&active, budget), &LmSettings::default()).unwrap();

            assert_eq!(oracle.calls(), 2 + 2 * budget, "budget {budget}");
            assert_eq!(out.report.iterations, budget);
            assert_eq!(out.report.status, CycleStatus::MaxItersReached);
            assert_eq!(out.parameters, start, "budget {budget}");
            assert_eq!(out.chi2, initial);
            assert_eq!(out.report.chi2_history, vec![initial]);
        }
    }
}
