//! Atmospheric components and the registry that names them.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::AtmosphereKind;
use crate::error::ModelError;

/// One named, bounded model parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    /// Nominal starting value.
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Standard deviation of the random-restart perturbation.
    pub perturbation: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64, min: f64, max: f64, perturbation: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min,
            max,
            perturbation,
        }
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }

    fn validate(&self, atmosphere: &str) -> Result<(), ModelError> {
        let param = format!("{atmosphere}.{}", self.name);
        let fail = |detail: String| ModelError::InvalidParameter {
            param: param.clone(),
            detail,
        };
        if ![self.value, self.min, self.max, self.perturbation]
            .iter()
            .all(|x| x.is_finite())
        {
            return Err(fail("value, bounds and perturbation must be finite".to_string()));
        }
        if self.min > self.max {
            return Err(fail(format!("min {} exceeds max {}", self.min, self.max)));
        }
        if self.value < self.min || self.value > self.max {
            return Err(fail(format!(
                "value {} outside bounds [{}, {}]",
                self.value, self.min, self.max
            )));
        }
        if self.perturbation < 0.0 {
            return Err(fail("perturbation must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// A named atmospheric component.
#[derive(Debug, Clone, PartialEq)]
pub struct Atmosphere {
    pub name: String,
    pub kind: AtmosphereKind,
    pub parameters: Vec<Parameter>,
    /// Ordering metadata for independent members of a topology.
    pub height: f64,
    /// Regions this atmosphere may appear in. Empty means every region.
    pub regions: Vec<String>,
}

impl Atmosphere {
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    pub fn nominal_values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn applies_to(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }
}

/// Read-only view of an atmosphere at a concrete parameter vector.
///
/// This is what the synthesis oracle receives.
#[derive(Debug, Clone, Copy)]
pub struct AtmosphereRef<'a> {
    pub atmosphere: &'a Atmosphere,
    pub values: &'a [f64],
}

impl<'a> AtmosphereRef<'a> {
    pub fn name(&self) -> &'a str {
        &self.atmosphere.name
    }

    pub fn kind(&self) -> AtmosphereKind {
        self.atmosphere.kind
    }

    /// Value of a named parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.atmosphere
            .parameter_index(name)
            .and_then(|i| self.values.get(i).copied())
    }
}

/// All atmospheres of a model, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct AtmosphereRegistry {
    atmospheres: Vec<Atmosphere>,
    index: HashMap<String, usize>,
}

impl AtmosphereRegistry {
    pub fn insert(&mut self, atmosphere: Atmosphere) -> Result<usize, ModelError> {
        if self.index.contains_key(&atmosphere.name) {
            return Err(ModelError::DuplicateAtmosphere(atmosphere.name));
        }
        for p in &atmosphere.parameters {
            p.validate(&atmosphere.name)?;
        }
        let id = self.atmospheres.len();
        self.index.insert(atmosphere.name.clone(), id);
        self.atmospheres.push(atmosphere);
        Ok(id)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Atmosphere> {
        self.index_of(name).map(|i| &self.atmospheres[i])
    }

    pub fn by_index(&self, index: usize) -> &Atmosphere {
        &self.atmospheres[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atmosphere> {
        self.atmospheres.iter()
    }

    pub fn len(&self) -> usize {
        self.atmospheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atmospheres.is_empty()
    }

    /// Names of the atmospheres allowed in `region`.
    pub fn names_in_region(&self, region: &str) -> Vec<&str> {
        self.atmospheres
            .iter()
            .filter(|a| a.applies_to(region))
            .map(|a| a.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atmosphere(name: &str, regions: &[&str]) -> Atmosphere {
        Atmosphere {
            name: name.to_string(),
            kind: AtmosphereKind::Parametric,
            parameters: vec![Parameter::new("depth", 0.5, -1.0, 1.0, 0.1)],
            height: 0.0,
            regions: regions.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = AtmosphereRegistry::default();
        registry.insert(atmosphere("te1", &[])).unwrap();
        assert_eq!(
            registry.insert(atmosphere("te1", &[])).unwrap_err(),
            ModelError::DuplicateAtmosphere("te1".to_string())
        );
    }

    #[test]
    fn value_outside_bounds_rejected() {
        let mut a = atmosphere("te1", &[]);
        a.parameters[0].value = 2.0;
        let err = AtmosphereRegistry::default().insert(a).unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter { ref param, .. } if param == "te1.depth"));
    }

    #[test]
    fn region_scope_filters_names() {
        let mut registry = AtmosphereRegistry::default();
        registry.insert(atmosphere("te1", &["Si"])).unwrap();
        registry.insert(atmosphere("st1", &[])).unwrap();
        assert_eq!(registry.names_in_region("Si"), vec!["te1", "st1"]);
        assert_eq!(registry.names_in_region("He"), vec!["st1"]);
    }
}
