//! Observed Stokes data for one pixel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::StokesProfile;

/// Per-sample noise: one value for everything, or full profiles per region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sigma {
    Scalar(f64),
    PerRegion(BTreeMap<String, StokesProfile>),
}

impl Default for Sigma {
    fn default() -> Self {
        Sigma::Scalar(1.0)
    }
}

impl Sigma {
    /// Noise of `region`, Stokes `component` (0..4), wavelength `sample`.
    pub fn at(&self, region: &str, component: usize, sample: usize) -> Option<f64> {
        match self {
            Sigma::Scalar(s) => Some(*s),
            Sigma::PerRegion(map) => map
                .get(region)
                .and_then(|p| p.components().get(component).and_then(|c| c.get(sample)).copied()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    /// Observed spectra keyed by region name.
    pub stokes: BTreeMap<String, StokesProfile>,
    #[serde(default)]
    pub sigma: Sigma,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_accepts_scalar_or_profiles() {
        let s: Sigma = serde_json::from_str("0.01").unwrap();
        assert_eq!(s.at("He", 3, 99), Some(0.01));

        let s: Sigma =
            serde_json::from_str(r#"{"He": {"i": [1, 2], "q": [3, 4], "u": [5, 6], "v": [7, 8]}}"#).unwrap();
        assert_eq!(s.at("He", 2, 1), Some(6.0));
        assert_eq!(s.at("He", 0, 2), None);
        assert_eq!(s.at("Si", 0, 0), None);
    }
}
