//! Atmosphere configuration, one explicit struct per kind.
//!
//! Parameter names are struct fields, so a misspelled parameter is a parse
//! error rather than a silently ignored key.

use serde::Deserialize;

use crate::domain::AtmosphereKind;
use crate::model::{Atmosphere, ChromospherePreset, Parameter, kinds};

/// A parameter override: a bare value, or any subset of value, bounds and
/// perturbation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterSpec {
    Value(f64),
    Detailed(DetailedParameter),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedParameter {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub perturbation: Option<f64>,
}

impl ParameterSpec {
    fn apply(&self, parameter: &mut Parameter) {
        match self {
            ParameterSpec::Value(v) => parameter.value = *v,
            ParameterSpec::Detailed(d) => {
                if let Some(v) = d.value {
                    parameter.value = v;
                }
                if let Some(v) = d.min {
                    parameter.min = v;
                }
                if let Some(v) = d.max {
                    parameter.max = v;
                }
                if let Some(v) = d.perturbation {
                    parameter.perturbation = v;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotosphereParameters {
    pub eta0: Option<ParameterSpec>,
    pub width: Option<ParameterSpec>,
    pub v: Option<ParameterSpec>,
    #[serde(rename = "Bx")]
    pub bx: Option<ParameterSpec>,
    #[serde(rename = "By")]
    pub by: Option<ParameterSpec>,
    #[serde(rename = "Bz")]
    pub bz: Option<ParameterSpec>,
    pub source: Option<ParameterSpec>,
    pub ff: Option<ParameterSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChromosphereParameters {
    #[serde(rename = "Bx")]
    pub bx: Option<ParameterSpec>,
    #[serde(rename = "By")]
    pub by: Option<ParameterSpec>,
    #[serde(rename = "Bz")]
    pub bz: Option<ParameterSpec>,
    pub tau: Option<ParameterSpec>,
    pub v: Option<ParameterSpec>,
    pub deltav: Option<ParameterSpec>,
    pub beta: Option<ParameterSpec>,
    pub a: Option<ParameterSpec>,
    pub ff: Option<ParameterSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParametricParameters {
    pub lambda0: Option<ParameterSpec>,
    pub sigma: Option<ParameterSpec>,
    pub depth: Option<ParameterSpec>,
    pub a: Option<ParameterSpec>,
    pub ff: Option<ParameterSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotosphereConfig {
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    pub height: Option<f64>,
    #[serde(default)]
    pub parameters: PhotosphereParameters,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChromosphereConfig {
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    pub height: Option<f64>,
    #[serde(default)]
    pub preset: ChromospherePreset,
    #[serde(default)]
    pub parameters: ChromosphereParameters,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParametricConfig {
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    pub height: Option<f64>,
    #[serde(default)]
    pub parameters: ParametricParameters,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AtmosphereConfig {
    Photosphere(PhotosphereConfig),
    Chromosphere(ChromosphereConfig),
    Parametric(ParametricConfig),
}

impl AtmosphereConfig {
    pub fn name(&self) -> &str {
        match self {
            AtmosphereConfig::Photosphere(c) => &c.name,
            AtmosphereConfig::Chromosphere(c) => &c.name,
            AtmosphereConfig::Parametric(c) => &c.name,
        }
    }

    pub fn kind(&self) -> AtmosphereKind {
        match self {
            AtmosphereConfig::Photosphere(_) => AtmosphereKind::Photosphere,
            AtmosphereConfig::Chromosphere(_) => AtmosphereKind::Chromosphere,
            AtmosphereConfig::Parametric(_) => AtmosphereKind::Parametric,
        }
    }

    pub fn regions(&self) -> &[String] {
        match self {
            AtmosphereConfig::Photosphere(c) => &c.regions,
            AtmosphereConfig::Chromosphere(c) => &c.regions,
            AtmosphereConfig::Parametric(c) => &c.regions,
        }
    }

    fn height(&self) -> Option<f64> {
        match self {
            AtmosphereConfig::Photosphere(c) => c.height,
            AtmosphereConfig::Chromosphere(c) => c.height,
            AtmosphereConfig::Parametric(c) => c.height,
        }
    }

    /// Overrides in layout order, paired with their parameter name.
    fn overrides(&self) -> Vec<(&'static str, Option<&ParameterSpec>)> {
        match self {
            AtmosphereConfig::Photosphere(c) => {
                let p = &c.parameters;
                vec![
                    ("eta0", p.eta0.as_ref()),
                    ("width", p.width.as_ref()),
                    ("v", p.v.as_ref()),
                    ("Bx", p.bx.as_ref()),
                    ("By", p.by.as_ref()),
                    ("Bz", p.bz.as_ref()),
                    ("source", p.source.as_ref()),
                    ("ff", p.ff.as_ref()),
                ]
            }
            AtmosphereConfig::Chromosphere(c) => {
                let p = &c.parameters;
                vec![
                    ("Bx", p.bx.as_ref()),
                    ("By", p.by.as_ref()),
                    ("Bz", p.bz.as_ref()),
                    ("tau", p.tau.as_ref()),
                    ("v", p.v.as_ref()),
                    ("deltav", p.deltav.as_ref()),
                    ("beta", p.beta.as_ref()),
                    ("a", p.a.as_ref()),
                    ("ff", p.ff.as_ref()),
                ]
            }
            AtmosphereConfig::Parametric(c) => {
                let p = &c.parameters;
                vec![
                    ("lambda0", p.lambda0.as_ref()),
                    ("sigma", p.sigma.as_ref()),
                    ("depth", p.depth.as_ref()),
                    ("a", p.a.as_ref()),
                    ("ff", p.ff.as_ref()),
                ]
            }
        }
    }

    /// Build the unsealed atmosphere.
    ///
    /// `line_center` anchors the parametric `lambda0` default; the caller passes
    /// the line of the first region this atmosphere is scoped to.
    pub fn to_atmosphere(&self, line_center: f64) -> Atmosphere {
        let kind = self.kind();
        let preset = match self {
            AtmosphereConfig::Chromosphere(c) => c.preset,
            _ => ChromospherePreset::default(),
        };
        let mut parameters = kinds::default_parameters(kind, line_center, preset);
        for (name, spec) in self.overrides() {
            let Some(spec) = spec else { continue };
            if let Some(parameter) = parameters.iter_mut().find(|p| p.name == name) {
                spec.apply(parameter);
            }
        }
        Atmosphere {
            name: self.name().to_string(),
            kind,
            parameters,
            height: self.height().unwrap_or_else(|| kind.default_height()),
            regions: self.regions().to_vec(),
        }
    }
}
