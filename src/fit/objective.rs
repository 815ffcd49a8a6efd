//! Weighted residuals between synthetic and observed spectra.
//!
//! Residuals are flattened region by region (model order), then Stokes
//! component (I, Q, U, V), then wavelength:
//!
//! ```text
//! r = (obs - syn) * sqrt(w) / sigma
//! chi2 = Σ r² / n
//! ```
//!
//! Non-finite observed samples are masked (zero scale).

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::domain::{Observation, StokesProfile};
use crate::error::{InversionError, SynthesisError};
use crate::model::{Model, ParameterSet};
use crate::synth::{Conditions, SynthesisOracle, evaluate, evaluate_all};

pub struct Objective<'a> {
    model: &'a Model,
    oracle: &'a dyn SynthesisOracle,
    conditions: Conditions,
    target: Vec<f64>,
    scale: Vec<f64>,
}

impl<'a> Objective<'a> {
    pub fn new(
        model: &'a Model,
        oracle: &'a dyn SynthesisOracle,
        observation: &Observation,
        conditions: Conditions,
    ) -> Result<Self, InversionError> {
        let mut target = Vec::new();
        let mut scale = Vec::new();

        for region in model.regions() {
            let Some(observed) = observation.stokes.get(&region.name) else {
                return Err(InversionError::MissingObservation(region.name.clone()));
            };
            let n = region.len();
            match observed.consistent_len() {
                Some(len) if len == n => {}
                other => {
                    return Err(InversionError::ShapeMismatch {
                        region: region.name.clone(),
                        expected: n,
                        got: other.unwrap_or(observed.i.len()),
                    });
                }
            }

            for (k, component) in observed.components().iter().enumerate() {
                for (j, &obs) in component.iter().enumerate() {
                    let weight = region.weights.at(k, j).sqrt();
                    let sigma = observation.sigma.at(&region.name, k, j);
                    let Some(sigma) = sigma.filter(|s| s.is_finite() && *s > 0.0) else {
                        return Err(InversionError::InvalidSigma {
                            region: region.name.clone(),
                            sample: k * n + j,
                        });
                    };
                    if obs.is_finite() {
                        target.push(obs);
                        scale.push(weight / sigma);
                    } else {
                        target.push(0.0);
                        scale.push(0.0);
                    }
                }
            }
        }

        Ok(Self {
            model,
            oracle,
            conditions,
            target,
            scale,
        })
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Number of residual samples.
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn residuals(&self, parameters: &ParameterSet) -> Result<DVector<f64>, SynthesisError> {
        let mut r = DVector::zeros(self.len());
        let mut offset = 0;
        for region in self.model.regions() {
            let synthetic = evaluate(self.model, self.oracle, region, parameters, &self.conditions)?;
            offset = self.fill(&synthetic, offset, &mut r);
        }
        Ok(r)
    }

    fn fill(&self, synthetic: &StokesProfile, mut offset: usize, r: &mut DVector<f64>) -> usize {
        for component in synthetic.components() {
            for &syn in component {
                r[offset] = (self.target[offset] - syn) * self.scale[offset];
                offset += 1;
            }
        }
        offset
    }

    pub fn chi2(&self, residuals: &DVector<f64>) -> f64 {
        residuals.norm_squared() / self.len().max(1) as f64
    }

    pub fn spectra(&self, parameters: &ParameterSet) -> Result<BTreeMap<String, StokesProfile>, SynthesisError> {
        evaluate_all(self.model, self.oracle, parameters, &self.conditions)
    }
}
