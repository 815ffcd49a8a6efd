//! Inversion settings: cycles, restarts and Levenberg–Marquardt knobs.

use serde::{Deserialize, Serialize};

use crate::domain::ParamRef;
use crate::error::ModelError;

/// One staged inversion phase.
///
/// Parameters not listed in `active` stay fixed for the cycle. A cycle resumes
/// from the best fit of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cycle {
    #[serde(default)]
    pub label: String,
    pub active: Vec<ParamRef>,
    /// Iteration budget for this cycle, overriding `max_iterations`.
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

impl Cycle {
    pub fn new(label: impl Into<String>, active: Vec<ParamRef>) -> Self {
        Self {
            label: label.into(),
            active,
            max_iterations: None,
        }
    }
}

/// Damped least-squares iteration controls.
#[derive(Debug, Clone, PartialEq)]
pub struct LmSettings {
    pub max_iterations: usize,
    /// Relative chi-square improvement below which a step counts as a stall.
    pub tolerance: f64,
    /// Consecutive stalled accepted steps before declaring convergence.
    pub patience: usize,
    /// Absolute chi-square at or below which the cycle converges immediately.
    pub chi2_floor: f64,
    pub lambda_init: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub lambda_max: f64,
    /// Finite-difference step as a fraction of each parameter's bound range.
    pub fd_step: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-4,
            patience: 2,
            chi2_floor: 1e-12,
            lambda_init: 1e-2,
            lambda_up: 10.0,
            lambda_down: 0.1,
            lambda_max: 1e8,
            fd_step: 1e-4,
        }
    }
}

impl LmSettings {
    pub fn validate(&self) -> Result<(), ModelError> {
        let positive = [
            ("tolerance", self.tolerance),
            ("lambda_init", self.lambda_init),
            ("lambda_max", self.lambda_max),
            ("fd_step", self.fd_step),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("must be finite and > 0, got {value}")));
            }
        }
        if self.fd_step > 0.5 {
            return Err(invalid("fd_step", format!("must be <= 0.5 of the bound range, got {}", self.fd_step)));
        }
        if !(self.chi2_floor.is_finite() && self.chi2_floor >= 0.0) {
            return Err(invalid("chi2_floor", format!("must be finite and >= 0, got {}", self.chi2_floor)));
        }
        if !(self.lambda_up.is_finite() && self.lambda_up > 1.0) {
            return Err(invalid("lambda_up", format!("must be > 1, got {}", self.lambda_up)));
        }
        if !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(invalid("lambda_down", format!("must be in (0, 1), got {}", self.lambda_down)));
        }
        if self.lambda_init > self.lambda_max {
            return Err(invalid("lambda_init", "must not exceed lambda_max".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be > 0".to_string()));
        }
        if self.patience == 0 {
            return Err(invalid("patience", "must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Everything the inversion engine needs beyond the model structure.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionSettings {
    pub cycles: Vec<Cycle>,
    /// Perturbed restarts on top of the nominal start (total starts = 1 + this).
    pub random_restarts: usize,
    pub seed: u64,
    pub lm: LmSettings,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            cycles: Vec::new(),
            random_restarts: 0,
            seed: 42,
            lm: LmSettings::default(),
        }
    }
}

impl InversionSettings {
    /// Iteration budget of the cycle at `index`.
    pub fn budget(&self, index: usize) -> usize {
        self.cycles
            .get(index)
            .and_then(|c| c.max_iterations)
            .unwrap_or(self.lm.max_iterations)
    }
}

fn invalid(field: &str, detail: String) -> ModelError {
    ModelError::InvalidSetting {
        field: field.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LmSettings::default().validate().is_ok());
    }

    #[test]
    fn bad_damping_factors_rejected() {
        let lm = LmSettings {
            lambda_down: 1.5,
            ..LmSettings::default()
        };
        assert!(matches!(
            lm.validate(),
            Err(ModelError::InvalidSetting { ref field, .. }) if field == "lambda_down"
        ));
    }

    #[test]
    fn fd_step_limited_to_half_the_range() {
        for (fd_step, ok) in [(0.5, true), (0.51, false), (0.0, false)] {
            let lm = LmSettings {
                fd_step,
                ..LmSettings::default()
            };
            assert_eq!(lm.validate().is_ok(), ok, "fd_step {fd_step}");
        }
    }

    #[test]
    fn cycle_budget_overrides_default() {
        let mut settings = InversionSettings::default();
        settings.cycles.push(Cycle::new("first", vec![ParamRef::new("ph1", "Bz")]));
        let mut second = Cycle::new("second", vec![]);
        second.max_iterations = Some(5);
        settings.cycles.push(second);
        assert_eq!(settings.budget(0), 30);
        assert_eq!(settings.budget(1), 5);
    }

    #[test]
    fn cycle_rejects_unknown_keys() {
        let ok: Cycle = serde_json::from_str(r#"{"active": ["ch1.Bz", "ch1.tau"]}"#).unwrap();
        assert_eq!(ok.active.len(), 2);
        assert!(serde_json::from_str::<Cycle>(r#"{"active": [], "iters": 3}"#).is_err());
        assert!(serde_json::from_str::<Cycle>(r#"{"active": ["nodot"]}"#).is_err());
    }
}
