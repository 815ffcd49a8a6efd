//! Forward model: compose per-atmosphere oracle outputs along a region topology.

use std::collections::BTreeMap;

use crate::domain::StokesProfile;
use crate::error::SynthesisError;
use crate::model::{AtmosphereRef, Model, ParameterSet, SpectralRegion};
use crate::synth::oracle::{SynthesisContext, SynthesisOracle};

/// Per-pixel observing geometry and illumination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    /// Cosine of the heliocentric angle.
    pub mu: f64,
    /// Overrides the region boundary condition when set.
    pub boundary: Option<[f64; 4]>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            mu: 1.0,
            boundary: None,
        }
    }
}

/// Synthesize one region.
///
/// Atmospheres run in the plan's evaluation order. A stacked atmosphere receives
/// the emergent spectrum of the component below it; superposed members share the
/// same incoming light and their outputs are summed.
pub fn evaluate(
    model: &Model,
    oracle: &dyn SynthesisOracle,
    region: &SpectralRegion,
    parameters: &ParameterSet,
    conditions: &Conditions,
) -> Result<StokesProfile, SynthesisError> {
    let n = region.wavelengths.len();
    let plan = &region.plan;
    let boundary = StokesProfile::uniform(n, conditions.boundary.unwrap_or(region.boundary));

    let mut outputs: Vec<Option<StokesProfile>> = vec![None; plan.node_count()];
    for step in plan.steps() {
        let Some(index) = model.atmospheres().index_of(&step.atmosphere) else {
            return Err(incomplete(&step.atmosphere, "atmosphere missing from registry"));
        };
        let atmosphere = model.atmospheres().by_index(index);
        let values = parameters.atmosphere(index);

        let incoming = match step.input {
            None => boundary.clone(),
            Some(node) => plan
                .emergent(node, &outputs)
                .ok_or_else(|| incomplete(&step.atmosphere, "input evaluated out of order"))?,
        };

        let context = SynthesisContext {
            region: &region.name,
            wavelengths: &region.wavelengths,
            incoming: &incoming,
            line: region.line,
            mu: conditions.mu,
        };
        let out = oracle.synthesize(&AtmosphereRef { atmosphere, values }, &context)?;

        match out.consistent_len() {
            Some(len) if len == n => {}
            other => {
                return Err(SynthesisError::GridMismatch {
                    atmosphere: atmosphere.name.clone(),
                    expected: n,
                    got: other.unwrap_or(out.i.len()),
                });
            }
        }
        if !out.is_finite() {
            return Err(SynthesisError::NumericalDivergence {
                atmosphere: atmosphere.name.clone(),
                detail: "oracle returned non-finite samples".to_string(),
                values: values.to_vec(),
            });
        }
        outputs[step.node] = Some(out);
    }

    plan.emergent(plan.root(), &outputs)
        .ok_or_else(|| incomplete(&region.name, "topology produced no output"))
}

/// Synthesize every region of the model, keyed by region name.
pub fn evaluate_all(
    model: &Model,
    oracle: &dyn SynthesisOracle,
    parameters: &ParameterSet,
    conditions: &Conditions,
) -> Result<BTreeMap<String, StokesProfile>, SynthesisError> {
    model
        .regions()
        .iter()
        .map(|region| Ok((region.name.clone(), evaluate(model, oracle, region, parameters, conditions)?)))
        .collect()
}

fn incomplete(atmosphere: &str, detail: &str) -> SynthesisError {
    SynthesisError::NumericalDivergence {
        atmosphere: atmosphere.to_string(),
        detail: detail.to_string(),
        values: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AtmosphereKind, WorkingMode};
    use crate::model::ModelBuilder;
    use crate::model::tests::{atmosphere, region};
    use crate::synth::AnalyticOracle;

    fn model(topology: &str) -> Model {
        ModelBuilder::new(WorkingMode::Synthesis)
            .atmosphere(atmosphere("ph1", AtmosphereKind::Photosphere))
            .atmosphere(atmosphere("ch1", AtmosphereKind::Chromosphere))
            .atmosphere(atmosphere("te1", AtmosphereKind::Parametric))
            .region(region("He", topology))
            .seal()
            .unwrap()
    }

    fn single(model: &Model, name: &str, incoming: &StokesProfile) -> StokesProfile {
        let region = &model.regions()[0];
        let index = model.atmospheres().index_of(name).unwrap();
        let params = ParameterSet::nominal(model);
        let ctx = SynthesisContext {
            region: &region.name,
            wavelengths: &region.wavelengths,
            incoming,
            line: region.line,
            mu: 1.0,
        };
        AnalyticOracle
            .synthesize(
                &AtmosphereRef {
                    atmosphere: model.atmospheres().by_index(index),
                    values: params.atmosphere(index),
                },
                &ctx,
            )
            .unwrap()
    }

    #[test]
    fn superposition_sums_independent_outputs() {
        let model = model("ch1+te1");
        let params = ParameterSet::nominal(&model);
        let merged = evaluate(&model, &AnalyticOracle, &model.regions()[0], &params, &Conditions::default()).unwrap();

        let continuum = StokesProfile::uniform(41, [1.0, 0.0, 0.0, 0.0]);
        let mut expected = single(&model, "ch1", &continuum);
        expected.add_assign(&single(&model, "te1", &continuum));
        assert!(merged.max_abs_diff(&expected) < 1e-15);

        // Superposition commutes.
        let swapped = self::model("te1+ch1");
        let other = evaluate(&swapped, &AnalyticOracle, &swapped.regions()[0], &params, &Conditions::default()).unwrap();
        assert!(merged.max_abs_diff(&other) < 1e-12);
    }

    #[test]
    fn stacking_feeds_lower_output_upwards() {
        let model = model("ph1->ch1");
        let params = ParameterSet::nominal(&model);
        let stacked = evaluate(&model, &AnalyticOracle, &model.regions()[0], &params, &Conditions::default()).unwrap();

        let continuum = StokesProfile::uniform(41, [1.0, 0.0, 0.0, 0.0]);
        let lower = single(&model, "ph1", &continuum);
        let expected = single(&model, "ch1", &lower);
        assert!(stacked.max_abs_diff(&expected) < 1e-15);

        // Stacking does not commute.
        let reversed = self::model("ch1->ph1");
        let other = evaluate(&reversed, &AnalyticOracle, &reversed.regions()[0], &params, &Conditions::default()).unwrap();
        assert!(stacked.max_abs_diff(&other) > 1e-6);
    }

    #[test]
    fn oracle_failure_is_tagged_with_atmosphere() {
        let model = model("ph1->ch1");
        let mut params = ParameterSet::nominal(&model);
        let slot = model.resolve(&"ch1.deltav".parse().unwrap()).unwrap();
        params.set(slot, -1.0);
        let err = evaluate_all(&model, &AnalyticOracle, &params, &Conditions::default()).unwrap_err();
        assert_eq!(err.atmosphere(), "ch1");
    }

    #[test]
    fn boundary_override_changes_continuum() {
        let model = model("te1");
        let params = ParameterSet::nominal(&model);
        let conditions = Conditions {
            mu: 1.0,
            boundary: Some([0.5, 0.0, 0.0, 0.0]),
        };
        let out = evaluate_all(&model, &AnalyticOracle, &params, &conditions).unwrap();
        assert!((out["He"].i[0] - 0.5).abs() < 1e-6);
    }
}
