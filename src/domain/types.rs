//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during synthesis and fitting
//! - sent to worker threads
//! - exported to JSON/CSV

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Labels of the four Stokes parameters, in storage order.
pub const STOKES_LABELS: [&str; 4] = ["I", "Q", "U", "V"];

/// Whether the model only synthesizes spectra or also fits observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingMode {
    Synthesis,
    Inversion,
}

/// Family of an atmospheric component.
///
/// The kind fixes the parameter vector layout (see `model::kinds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtmosphereKind {
    /// Line-forming photospheric slab, usually at the bottom of a stack.
    Photosphere,
    /// Optically thin-to-thick chromospheric slab (constant-property).
    Chromosphere,
    /// Parametric line profile or systematic (telluric, straylight).
    Parametric,
}

impl AtmosphereKind {
    pub fn display_name(self) -> &'static str {
        match self {
            AtmosphereKind::Photosphere => "photosphere",
            AtmosphereKind::Chromosphere => "chromosphere",
            AtmosphereKind::Parametric => "parametric",
        }
    }

    /// Default height used to order components when the config gives none.
    pub fn default_height(self) -> f64 {
        match self {
            AtmosphereKind::Photosphere => 0.0,
            AtmosphereKind::Chromosphere => 1.0,
            AtmosphereKind::Parametric => 2.0,
        }
    }
}

/// A full Stokes vector sampled on a wavelength grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StokesProfile {
    pub i: Vec<f64>,
    pub q: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

impl StokesProfile {
    pub fn zeros(n: usize) -> Self {
        Self::uniform(n, [0.0; 4])
    }

    /// Constant profile, e.g. a continuum boundary condition `[1, 0, 0, 0]`.
    pub fn uniform(n: usize, value: [f64; 4]) -> Self {
        Self {
            i: vec![value[0]; n],
            q: vec![value[1]; n],
            u: vec![value[2]; n],
            v: vec![value[3]; n],
        }
    }

    /// Number of wavelength samples, or `None` when the four components disagree.
    pub fn consistent_len(&self) -> Option<usize> {
        let n = self.i.len();
        (self.q.len() == n && self.u.len() == n && self.v.len() == n).then_some(n)
    }

    pub fn len(&self) -> usize {
        self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }

    pub fn components(&self) -> [&[f64]; 4] {
        [&self.i, &self.q, &self.u, &self.v]
    }

    pub fn components_mut(&mut self) -> [&mut Vec<f64>; 4] {
        [&mut self.i, &mut self.q, &mut self.u, &mut self.v]
    }

    pub fn is_finite(&self) -> bool {
        self.components()
            .iter()
            .all(|c| c.iter().all(|x| x.is_finite()))
    }

    /// Sample-wise `self += other`. Lengths must match.
    pub fn add_assign(&mut self, other: &StokesProfile) {
        for (dst, src) in self.components_mut().into_iter().zip(other.components()) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
    }

    /// Largest absolute sample-wise difference across all four components.
    pub fn max_abs_diff(&self, other: &StokesProfile) -> f64 {
        self.components()
            .iter()
            .zip(other.components())
            .flat_map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()))
            .fold(0.0, f64::max)
    }
}

/// Reference to one parameter of one atmosphere, written `atmosphere.parameter`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamRef {
    pub atmosphere: String,
    pub parameter: String,
}

impl ParamRef {
    pub fn new(atmosphere: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            atmosphere: atmosphere.into(),
            parameter: parameter.into(),
        }
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.atmosphere, self.parameter)
    }
}

impl FromStr for ParamRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((atm, param)) = s.trim().split_once('.') else {
            return Err(format!("'{s}' is not of the form atmosphere.parameter"));
        };
        if atm.is_empty() || param.is_empty() || param.contains('.') {
            return Err(format!("'{s}' is not of the form atmosphere.parameter"));
        }
        Ok(ParamRef::new(atm, param))
    }
}

impl TryFrom<String> for ParamRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParamRef> for String {
    fn from(value: ParamRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_ref_parses_and_renders() {
        let r: ParamRef = "ch1.Bz".parse().unwrap();
        assert_eq!(r, ParamRef::new("ch1", "Bz"));
        assert_eq!(r.to_string(), "ch1.Bz");
        assert!("ch1".parse::<ParamRef>().is_err());
        assert!("ch1.".parse::<ParamRef>().is_err());
        assert!("a.b.c".parse::<ParamRef>().is_err());
    }

    #[test]
    fn stokes_add_is_samplewise() {
        let mut a = StokesProfile::uniform(3, [1.0, 0.0, 0.5, -1.0]);
        let b = StokesProfile::uniform(3, [0.5, 0.25, 0.0, 1.0]);
        a.add_assign(&b);
        assert_eq!(a.i, vec![1.5; 3]);
        assert_eq!(a.q, vec![0.25; 3]);
        assert_eq!(a.u, vec![0.5; 3]);
        assert_eq!(a.v, vec![0.0; 3]);
        assert_eq!(a.consistent_len(), Some(3));
    }

    #[test]
    fn stokes_len_mismatch_detected() {
        let mut p = StokesProfile::zeros(4);
        p.v.pop();
        assert_eq!(p.consistent_len(), None);
    }
}
