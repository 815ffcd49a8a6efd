//! Observation files: per-pixel observed Stokes data and pixel settings.
//!
//! ```json
//! {"pixels": [
//!   {"index": 0, "los": [30, 0, 90], "initial": {"ch1.Bz": 80},
//!    "stokes": {"He": {"i": [...], "q": [...], "u": [...], "v": [...]}},
//!    "sigma": 0.001}
//! ]}
//! ```
//!
//! The same file format is written by `synth --export-observations`, so a
//! synthetic run can be fed straight back into an inversion.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::distribute::{PixelOutput, PixelRecord, PixelTask};
use crate::domain::{Observation, ParamRef, Sigma, StokesProfile};
use crate::error::{AppError, ConfigError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationFile {
    pub pixels: Vec<PixelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PixelEntry {
    pub index: usize,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub los: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial: BTreeMap<ParamRef, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stokes: BTreeMap<String, StokesProfile>,
    #[serde(default)]
    pub sigma: Sigma,
}

fn default_active() -> bool {
    true
}

impl PixelEntry {
    pub fn into_task(self) -> PixelTask {
        let observation = (!self.stokes.is_empty()).then(|| Observation {
            stokes: self.stokes,
            sigma: self.sigma,
        });
        PixelTask {
            index: self.index,
            active: self.active,
            los: self.los,
            boundary: self.boundary,
            initial: self.initial,
            observation,
        }
    }
}

impl ObservationFile {
    pub fn into_tasks(self) -> Vec<PixelTask> {
        self.pixels.into_iter().map(PixelEntry::into_task).collect()
    }

    /// Observation file from synthesized spectra.
    ///
    /// Pixels without spectra (skipped or failed) are left out. Pixel settings
    /// (geometry, overrides) are copied from `tasks` so the file reproduces the run.
    pub fn from_synthesis(tasks: &[PixelTask], records: &[PixelRecord], sigma: f64) -> Self {
        let by_index: BTreeMap<usize, &PixelTask> = tasks.iter().map(|t| (t.index, t)).collect();
        let pixels = records
            .iter()
            .filter_map(|record| {
                let PixelOutput::Synthesis { spectra } = &record.output else {
                    return None;
                };
                let task = by_index.get(&record.pixel);
                Some(PixelEntry {
                    index: record.pixel,
                    active: true,
                    los: task.and_then(|t| t.los),
                    boundary: task.and_then(|t| t.boundary),
                    initial: BTreeMap::new(),
                    stokes: spectra.clone(),
                    sigma: Sigma::Scalar(if sigma > 0.0 { sigma } else { 1.0 }),
                })
            })
            .collect();
        Self { pixels }
    }
}

pub fn read_observations(path: &Path) -> Result<ObservationFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_observations(path: &Path, file: &ObservationFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create observation file '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(out), file)
        .map_err(|e| AppError::new(4, format!("Failed to write observation file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_become_tasks() {
        let file: ObservationFile = serde_json::from_str(
            r#"{"pixels": [
                {"index": 4, "los": [60, 0, 0], "initial": {"ch1.Bz": 80},
                 "stokes": {"He": {"i": [1, 0.9], "q": [0, 0], "u": [0, 0], "v": [0, 0.01]}},
                 "sigma": 0.01},
                {"index": 5, "active": false}
            ]}"#,
        )
        .unwrap();
        let tasks = file.into_tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].index, 4);
        assert_eq!(tasks[0].initial[&ParamRef::new("ch1", "Bz")], 80.0);
        let obs = tasks[0].observation.as_ref().unwrap();
        assert_eq!(obs.stokes["He"].i, vec![1.0, 0.9]);
        assert_eq!(obs.sigma, Sigma::Scalar(0.01));
        assert!(!tasks[1].active);
        assert!(tasks[1].observation.is_none());
    }

    #[test]
    fn unknown_pixel_keys_rejected() {
        assert!(serde_json::from_str::<ObservationFile>(r#"{"pixels": [{"index": 0, "mask": 1}]}"#).is_err());
        assert!(serde_json::from_str::<ObservationFile>(r#"{"pixels": [{"index": 0, "initial": {"Bz": 1}}]}"#).is_err());
    }

    #[test]
    fn synthesized_pixels_are_exported() {
        let mut tasks = vec![PixelTask::new(0), PixelTask::new(1)];
        tasks[1].los = Some([30.0, 0.0, 0.0]);
        let mut spectra = BTreeMap::new();
        spectra.insert("He".to_string(), StokesProfile::uniform(3, [1.0, 0.0, 0.0, 0.0]));
        let records = vec![
            PixelRecord {
                pixel: 0,
                output: PixelOutput::Skipped,
            },
            PixelRecord {
                pixel: 1,
                output: PixelOutput::Synthesis { spectra },
            },
        ];
        let file = ObservationFile::from_synthesis(&tasks, &records, 1e-3);
        assert_eq!(file.pixels.len(), 1);
        assert_eq!(file.pixels[0].los, Some([30.0, 0.0, 0.0]));

        let text = serde_json::to_string(&file).unwrap();
        let back: ObservationFile = serde_json::from_str(&text).unwrap();
        assert_eq!(back, file);
    }
}
