//! Reporting utilities: run statistics and worst-fit rankings.

pub mod format;

pub use format::*;

use crate::distribute::{PixelOutput, PixelRecord};

/// Aggregate counts over one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub pixels: usize,
    pub synthesized: usize,
    pub inverted: usize,
    pub converged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Min / median / max chi-square over inverted pixels.
    pub chi2: Option<(f64, f64, f64)>,
}

pub fn run_stats(records: &[PixelRecord]) -> RunStats {
    let mut stats = RunStats {
        pixels: records.len(),
        ..RunStats::default()
    };
    let mut chi2 = Vec::new();
    for record in records {
        match &record.output {
            PixelOutput::Synthesis { .. } => stats.synthesized += 1,
            PixelOutput::Inversion(result) => {
                stats.inverted += 1;
                if result.converged() {
                    stats.converged += 1;
                }
                chi2.push(result.chi2);
            }
            PixelOutput::Skipped => stats.skipped += 1,
            PixelOutput::Failed(_) => stats.failed += 1,
        }
    }
    chi2.sort_by(f64::total_cmp);
    if let (Some(&lo), Some(&hi)) = (chi2.first(), chi2.last()) {
        stats.chi2 = Some((lo, chi2[chi2.len() / 2], hi));
    }
    stats
}

/// Inverted pixels with the highest final chi-square, worst first.
pub fn rank_worst_fits(records: &[PixelRecord], top_n: usize) -> Vec<(usize, f64)> {
    let mut fits: Vec<(usize, f64)> = records
        .iter()
        .filter_map(|r| match &r.output {
            PixelOutput::Inversion(result) => Some((r.pixel, result.chi2)),
            _ => None,
        })
        .collect();
    fits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    fits.truncate(top_n);
    fits
}
