//! Spectral regions: wavelength windows with their own topology.

use serde::{Deserialize, Serialize};

use crate::domain::StokesProfile;
use crate::error::ModelError;
use crate::topology::CompositionPlan;

/// Spectral line synthesized in a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpectralLine {
    /// Rest wavelength (Å).
    pub center: f64,
    /// Effective Landé factor.
    #[serde(default = "default_lande")]
    pub lande: f64,
}

fn default_lande() -> f64 {
    1.0
}

/// Fit weights: one per Stokes component, or one per component and sample.
///
/// A zero weight removes the sample from the fit (e.g. a telluric blend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weights {
    Stokes([f64; 4]),
    PerSample(StokesProfile),
}

impl Default for Weights {
    fn default() -> Self {
        Weights::Stokes([1.0; 4])
    }
}

impl From<[f64; 4]> for Weights {
    fn from(w: [f64; 4]) -> Self {
        Weights::Stokes(w)
    }
}

impl Weights {
    /// Weight of Stokes `component` (0..4) at wavelength `sample`.
    pub fn at(&self, component: usize, sample: usize) -> f64 {
        match self {
            Weights::Stokes(w) => w.get(component).copied().unwrap_or(0.0),
            Weights::PerSample(p) => p
                .components()
                .get(component)
                .and_then(|c| c.get(sample))
                .copied()
                .unwrap_or(0.0),
        }
    }

    fn check(&self, n: usize) -> Result<(), String> {
        let values: Vec<f64> = match self {
            Weights::Stokes(w) => w.to_vec(),
            Weights::PerSample(p) => {
                if p.consistent_len() != Some(n) {
                    return Err(format!("per-sample weights must have {n} samples per Stokes component"));
                }
                p.components().concat()
            }
        };
        if let Some(i) = values.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!("weights must be finite and >= 0 (entry {i} is {})", values[i]));
        }
        Ok(())
    }
}

/// Unsealed region description accepted by `ModelBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub name: String,
    pub wavelengths: Vec<f64>,
    pub topology: String,
    pub line: SpectralLine,
    pub weights: Weights,
    /// Incoming Stokes vector at the bottom of the topology.
    pub boundary: [f64; 4],
}

impl RegionSpec {
    pub fn new(name: impl Into<String>, wavelengths: Vec<f64>, topology: impl Into<String>, line: SpectralLine) -> Self {
        Self {
            name: name.into(),
            wavelengths,
            topology: topology.into(),
            line,
            weights: Weights::default(),
            boundary: [1.0, 0.0, 0.0, 0.0],
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        let fail = |detail: String| ModelError::InvalidGrid {
            region: self.name.clone(),
            detail,
        };
        if self.wavelengths.is_empty() {
            return Err(fail("wavelength grid is empty".to_string()));
        }
        if let Some(i) = self.wavelengths.iter().position(|x| !x.is_finite()) {
            return Err(fail(format!("wavelength sample {i} is not finite")));
        }
        if let Some(i) = self.wavelengths.windows(2).position(|w| w[1] <= w[0]) {
            return Err(fail(format!("wavelength grid is not strictly increasing at sample {}", i + 1)));
        }
        if !(self.line.center.is_finite() && self.line.center > 0.0 && self.line.lande.is_finite()) {
            return Err(fail(format!("invalid line center {} / lande {}", self.line.center, self.line.lande)));
        }
        self.weights.check(self.wavelengths.len()).map_err(fail)?;
        if self.boundary.iter().any(|b| !b.is_finite()) {
            return Err(fail(format!("boundary must be finite, got {:?}", self.boundary)));
        }
        Ok(())
    }
}

/// Evenly spaced grid of `n` samples in `[min, max]`.
pub fn linear_grid(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => (0..n)
            .map(|i| min + (max - min) * i as f64 / (n as f64 - 1.0))
            .collect(),
    }
}

/// A sealed region with its resolved composition plan.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralRegion {
    pub name: String,
    pub wavelengths: Vec<f64>,
    pub topology: String,
    pub plan: CompositionPlan,
    pub line: SpectralLine,
    pub weights: Weights,
    pub boundary: [f64; 4],
}

impl SpectralRegion {
    pub(crate) fn from_spec(spec: RegionSpec, plan: CompositionPlan) -> Self {
        Self {
            name: spec.name,
            wavelengths: spec.wavelengths,
            topology: spec.topology,
            plan,
            line: spec.line,
            weights: spec.weights,
            boundary: spec.boundary,
        }
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> SpectralLine {
        SpectralLine {
            center: 10830.0,
            lande: 1.0,
        }
    }

    #[test]
    fn linear_grid_endpoints() {
        let g = linear_grid(10829.0, 10831.0, 5);
        assert_eq!(g.len(), 5);
        assert_eq!(g[0], 10829.0);
        assert!((g[4] - 10831.0).abs() < 1e-9);
        assert_eq!(linear_grid(1.0, 2.0, 1), vec![1.0]);
    }

    #[test]
    fn non_monotonic_grid_rejected() {
        let spec = RegionSpec::new("He", vec![1.0, 2.0, 2.0], "ch1", line());
        assert!(matches!(
            spec.validate(),
            Err(ModelError::InvalidGrid { ref detail, .. }) if detail.contains("sample 2")
        ));
        assert!(RegionSpec::new("He", vec![], "ch1", line()).validate().is_err());
        assert!(RegionSpec::new("He", vec![1.0, 2.0], "ch1", line()).validate().is_ok());
    }

    #[test]
    fn weights_per_stokes_or_per_sample() {
        let w: Weights = serde_json::from_str("[1, 0, 0, 2]").unwrap();
        assert_eq!(w.at(3, 17), 2.0);

        let w: Weights =
            serde_json::from_str(r#"{"i": [1, 0, 1], "q": [1, 1, 1], "u": [1, 1, 1], "v": [1, 1, 1]}"#).unwrap();
        assert_eq!(w.at(0, 1), 0.0);
        assert_eq!(w.at(0, 2), 1.0);

        let mut spec = RegionSpec::new("He", vec![1.0, 2.0, 3.0], "ch1", line());
        spec.weights = w;
        assert!(spec.validate().is_ok());
        spec.wavelengths.push(4.0);
        assert!(matches!(
            spec.validate(),
            Err(ModelError::InvalidGrid { ref detail, .. }) if detail.contains("4 samples")
        ));

        spec.weights = [1.0, -1.0, 0.0, 0.0].into();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn lande_defaults_to_one() {
        let line: SpectralLine = serde_json::from_str(r#"{"center": 6302.5}"#).unwrap();
        assert_eq!(line.lande, 1.0);
    }
}
