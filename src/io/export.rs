//! Per-pixel CSV summary.
//!
//! One row per pixel: status, fit quality and every model parameter as its own
//! `atmosphere.parameter` column. Parameter cells are empty for pixels without
//! an inversion result.

use std::io::Write;
use std::path::Path;

use crate::distribute::{PixelOutput, PixelRecord};
use crate::error::AppError;
use crate::model::Model;

const FIXED_COLUMNS: [&str; 7] = ["pixel", "status", "chi2", "restart", "iterations", "converged", "message"];

pub fn write_summary_csv(path: &Path, model: &Model, records: &[PixelRecord]) -> Result<(), AppError> {
    let file = std::fs::File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create summary CSV '{}': {e}", path.display())))?;
    write_summary(file, model, records)
}

pub fn write_summary<W: Write>(out: W, model: &Model, records: &[PixelRecord]) -> Result<(), AppError> {
    let fail = |e: csv::Error| AppError::new(4, format!("Failed to write summary CSV: {e}"));
    let params = model.parameter_refs();

    let mut writer = csv::Writer::from_writer(out);
    let header: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(params.iter().map(|p| p.to_string()))
        .collect();
    writer.write_record(&header).map_err(fail)?;

    for record in records {
        let mut row = vec![record.pixel.to_string(), record.output.status().to_string()];
        match &record.output {
            PixelOutput::Inversion(result) => {
                row.push(format!("{:.6e}", result.chi2));
                row.push(result.restart.to_string());
                row.push(result.iterations.to_string());
                row.push(result.converged().to_string());
                row.push(String::new());
                for p in &params {
                    let value = result
                        .parameters
                        .get(&p.atmosphere)
                        .and_then(|a| a.get(&p.parameter));
                    row.push(value.map(|v| format!("{v:.6}")).unwrap_or_default());
                }
            }
            other => {
                let message = match other {
                    PixelOutput::Failed(f) => format!("{}: {}", f.kind, f.message),
                    _ => String::new(),
                };
                row.extend([String::new(), String::new(), String::new(), String::new(), message]);
                row.extend(params.iter().map(|_| String::new()));
            }
        }
        writer.write_record(&row).map_err(fail)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush summary CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribute::FailureKind;
    use crate::fit::lm::tests::telluric_model;

    #[test]
    fn one_row_per_pixel_with_parameter_columns() {
        let model = telluric_model();
        let records = vec![
            PixelRecord {
                pixel: 0,
                output: PixelOutput::Skipped,
            },
            PixelRecord {
                pixel: 1,
                output: PixelOutput::failed(FailureKind::WorkerLost, "worker 2 disconnected"),
            },
        ];
        let mut buf = Vec::new();
        write_summary(&mut buf, &model, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "pixel,status,chi2,restart,iterations,converged,message,te1.lambda0,te1.sigma,te1.depth,te1.a,te1.ff"
        );
        assert!(lines[2].starts_with("1,failed,,,,,worker_lost: worker 2 disconnected,"));
        assert_eq!(lines[1].split(',').count(), 12);
    }
}
