//! Result JSON files.
//!
//! One document per run: generation metadata plus one record per pixel, in
//! pixel order.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::distribute::PixelRecord;
use crate::domain::WorkingMode;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct ResultsFile<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub mode: WorkingMode,
    pub pixels: &'a [PixelRecord],
}

impl<'a> ResultsFile<'a> {
    pub fn new(mode: WorkingMode, pixels: &'a [PixelRecord]) -> Self {
        Self {
            tool: "sfit",
            version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now(),
            mode,
            pixels,
        }
    }
}

/// Write a results JSON file.
pub fn write_results_json(path: &Path, mode: WorkingMode, records: &[PixelRecord]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create results JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ResultsFile::new(mode, records))
        .map_err(|e| AppError::new(4, format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribute::{FailureKind, PixelOutput};

    #[test]
    fn records_serialize_with_status_tags() {
        let records = vec![
            PixelRecord {
                pixel: 0,
                output: PixelOutput::Skipped,
            },
            PixelRecord {
                pixel: 1,
                output: PixelOutput::failed(FailureKind::InversionDiverged, "cycle 1 diverged"),
            },
        ];
        let json = serde_json::to_value(ResultsFile::new(WorkingMode::Inversion, &records)).unwrap();
        assert_eq!(json["tool"], "sfit");
        assert_eq!(json["mode"], "inversion");
        assert_eq!(json["pixels"][0]["status"], "skipped");
        assert_eq!(json["pixels"][1]["kind"], "inversion_diverged");
        assert!(json["generated_at"].is_string());
    }
}
