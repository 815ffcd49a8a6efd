//! Best-of-restarts selection.
//!
//! Rules:
//! 1. Failed restarts are discarded
//! 2. The lowest final chi-square wins
//! 3. Ties go to the lowest restart index (the nominal start is index 0)
//!
//! If every restart failed, the first error (in restart order) is reported.

use crate::error::InversionError;
use crate::fit::lm::CycleReport;
use crate::model::ParameterSet;

/// Final state of one restart after all cycles.
#[derive(Debug, Clone)]
pub struct RestartOutcome {
    pub restart: usize,
    pub parameters: ParameterSet,
    pub chi2: f64,
    /// Iterations summed over cycles.
    pub iterations: usize,
    pub cycles: Vec<CycleReport>,
}

pub fn select_best(outcomes: Vec<Result<RestartOutcome, InversionError>>) -> Result<RestartOutcome, InversionError> {
    let mut best: Option<RestartOutcome> = None;
    let mut first_error: Option<InversionError> = None;

    for outcome in outcomes {
        match outcome {
            Ok(candidate) => {
                let better = match &best {
                    None => true,
                    Some(b) => {
                        candidate.chi2 < b.chi2 || (candidate.chi2 == b.chi2 && candidate.restart < b.restart)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match (best, first_error) {
        (Some(best), _) => Ok(best),
        (None, Some(err)) => Err(err),
        (None, None) => Err(InversionError::InvalidTask("no restarts were run".to_string())),
    }
}
