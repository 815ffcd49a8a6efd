//! Model structure: atmospheres, spectral regions and inversion settings.
//!
//! A [`Model`] is only obtainable through [`ModelBuilder::seal`], which validates
//! every region topology against the atmosphere registry. The sealed model has no
//! mutating API; per-pixel parameter values live in a separate [`ParameterSet`].

pub mod atmosphere;
pub mod kinds;
pub mod region;

use std::collections::{BTreeMap, HashSet};

use crate::domain::{ParamRef, WorkingMode};
use crate::error::{ModelError, ParseError};
use crate::fit::settings::InversionSettings;
use crate::topology;

pub use atmosphere::{Atmosphere, AtmosphereRef, AtmosphereRegistry, Parameter};
pub use kinds::ChromospherePreset;
pub use region::{RegionSpec, SpectralLine, SpectralRegion, Weights, linear_grid};

/// Position of one parameter inside a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub atmosphere: usize,
    pub parameter: usize,
}

/// Immutable, validated model.
#[derive(Debug, Clone)]
pub struct Model {
    mode: WorkingMode,
    registry: AtmosphereRegistry,
    regions: Vec<SpectralRegion>,
    inversion: InversionSettings,
}

impl Model {
    pub fn mode(&self) -> WorkingMode {
        self.mode
    }

    pub fn atmospheres(&self) -> &AtmosphereRegistry {
        &self.registry
    }

    pub fn regions(&self) -> &[SpectralRegion] {
        &self.regions
    }

    pub fn region(&self, name: &str) -> Option<&SpectralRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn inversion(&self) -> &InversionSettings {
        &self.inversion
    }

    pub fn resolve(&self, param: &ParamRef) -> Option<Slot> {
        let atmosphere = self.registry.index_of(&param.atmosphere)?;
        let parameter = self.registry.by_index(atmosphere).parameter_index(&param.parameter)?;
        Some(Slot { atmosphere, parameter })
    }

    pub fn parameter(&self, slot: Slot) -> &Parameter {
        &self.registry.by_index(slot.atmosphere).parameters[slot.parameter]
    }

    pub fn param_ref(&self, slot: Slot) -> ParamRef {
        let atmosphere = self.registry.by_index(slot.atmosphere);
        ParamRef::new(&atmosphere.name, &atmosphere.parameters[slot.parameter].name)
    }

    /// Every parameter of every atmosphere, in declaration order.
    pub fn parameter_refs(&self) -> Vec<ParamRef> {
        self.registry
            .iter()
            .flat_map(|a| a.parameters.iter().map(|p| ParamRef::new(&a.name, &p.name)))
            .collect()
    }
}

/// Collects atmospheres and regions, then validates them into a [`Model`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    mode: WorkingMode,
    atmospheres: Vec<Atmosphere>,
    regions: Vec<RegionSpec>,
    inversion: InversionSettings,
}

impl ModelBuilder {
    pub fn new(mode: WorkingMode) -> Self {
        Self {
            mode,
            atmospheres: Vec::new(),
            regions: Vec::new(),
            inversion: InversionSettings::default(),
        }
    }

    pub fn atmosphere(mut self, atmosphere: Atmosphere) -> Self {
        self.atmospheres.push(atmosphere);
        self
    }

    pub fn region(mut self, region: RegionSpec) -> Self {
        self.regions.push(region);
        self
    }

    pub fn inversion(mut self, settings: InversionSettings) -> Self {
        self.inversion = settings;
        self
    }

    pub fn seal(self) -> Result<Model, ModelError> {
        if self.regions.is_empty() {
            return Err(ModelError::NoRegions);
        }

        let mut seen_regions = HashSet::new();
        for region in &self.regions {
            if !seen_regions.insert(region.name.as_str()) {
                return Err(ModelError::DuplicateRegion(region.name.clone()));
            }
        }

        let mut registry = AtmosphereRegistry::default();
        for atmosphere in self.atmospheres {
            if let Some(region) = atmosphere.regions.iter().find(|r| !seen_regions.contains(r.as_str())) {
                return Err(ModelError::UnknownRegionScope {
                    atmosphere: atmosphere.name.clone(),
                    region: region.clone(),
                });
            }
            registry.insert(atmosphere)?;
        }

        let mut regions = Vec::with_capacity(self.regions.len());
        let mut used = HashSet::new();
        for spec in self.regions {
            spec.validate()?;
            let plan = resolve_topology(&registry, &spec)?;
            for step in plan.steps() {
                used.insert(step.atmosphere.clone());
            }
            regions.push(SpectralRegion::from_spec(spec, plan));
        }

        for atmosphere in registry.iter() {
            if !used.contains(&atmosphere.name) {
                log::warn!("atmosphere '{}' is not referenced by any topology", atmosphere.name);
            }
        }

        let model = Model {
            mode: self.mode,
            registry,
            regions,
            inversion: self.inversion,
        };
        validate_inversion(&model)?;
        Ok(model)
    }
}

fn resolve_topology(registry: &AtmosphereRegistry, spec: &RegionSpec) -> Result<topology::CompositionPlan, ModelError> {
    let scope = registry.names_in_region(&spec.name);
    let height_of = |name: &str| registry.get(name).map(|a| a.height).unwrap_or(0.0);
    topology::parse_with_heights(&spec.topology, &scope, height_of).map_err(|source| match source {
        ParseError::UnknownAtmosphere { ref name, .. } if registry.get(name).is_some() => ModelError::OutOfScope {
            region: spec.name.clone(),
            atmosphere: name.clone(),
        },
        source => ModelError::Topology {
            region: spec.name.clone(),
            source,
        },
    })
}

fn validate_inversion(model: &Model) -> Result<(), ModelError> {
    let settings = &model.inversion;
    if model.mode == WorkingMode::Inversion && settings.cycles.is_empty() {
        return Err(ModelError::NoCycles);
    }
    for (i, cycle) in settings.cycles.iter().enumerate() {
        if cycle.active.is_empty() {
            return Err(ModelError::EmptyCycle(i + 1));
        }
        if let Some(param) = cycle.active.iter().find(|p| model.resolve(p).is_none()) {
            return Err(ModelError::UnknownCycleParameter {
                cycle: i + 1,
                param: param.to_string(),
            });
        }
        if cycle.max_iterations == Some(0) {
            return Err(ModelError::InvalidSetting {
                field: format!("cycles[{i}].max_iterations"),
                detail: "must be > 0".to_string(),
            });
        }
    }
    settings.lm.validate()
}

/// Per-pixel parameter values, one vector per atmosphere.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    values: Vec<Vec<f64>>,
}

impl ParameterSet {
    /// Nominal values declared in the model.
    pub fn nominal(model: &Model) -> Self {
        Self {
            values: model.registry.iter().map(Atmosphere::nominal_values).collect(),
        }
    }

    /// Nominal values with initial-guess overrides applied and clamped to bounds.
    pub fn with_overrides(model: &Model, overrides: &BTreeMap<ParamRef, f64>) -> Result<Self, ModelError> {
        let mut set = Self::nominal(model);
        for (param, &value) in overrides {
            let Some(slot) = model.resolve(param) else {
                return Err(ModelError::InvalidParameter {
                    param: param.to_string(),
                    detail: "unknown parameter".to_string(),
                });
            };
            if !value.is_finite() {
                return Err(ModelError::InvalidParameter {
                    param: param.to_string(),
                    detail: format!("initial value {value} is not finite"),
                });
            }
            set.set(slot, model.parameter(slot).clamp(value));
        }
        Ok(set)
    }

    pub fn get(&self, slot: Slot) -> f64 {
        self.values[slot.atmosphere][slot.parameter]
    }

    pub fn set(&mut self, slot: Slot, value: f64) {
        self.values[slot.atmosphere][slot.parameter] = value;
    }

    pub fn atmosphere(&self, index: usize) -> &[f64] {
        &self.values[index]
    }

    /// `{atmosphere: {parameter: value}}`.
    pub fn to_named(&self, model: &Model) -> BTreeMap<String, BTreeMap<String, f64>> {
        model
            .registry
            .iter()
            .zip(&self.values)
            .map(|(atmosphere, values)| {
                let named = atmosphere
                    .parameters
                    .iter()
                    .zip(values)
                    .map(|(p, v)| (p.name.clone(), *v))
                    .collect();
                (atmosphere.name.clone(), named)
            })
            .collect()
    }
}
