//! Formatted terminal output.
//!
//! We keep formatting code in one place so the numeric code stays clean and
//! output changes are localized.

use crate::distribute::{Distribution, PixelOutput, PixelRecord};
use crate::model::Model;
use crate::report::{rank_worst_fits, run_stats};

/// Model structure as seen after sealing: regions, plans and parameters.
pub fn format_model(model: &Model) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== sfit - model check ({:?}) ===\n", model.mode()));

    out.push_str("\nRegions:\n");
    for region in model.regions() {
        let (lo, hi) = match (region.wavelengths.first(), region.wavelengths.last()) {
            (Some(lo), Some(hi)) => (*lo, *hi),
            _ => (f64::NAN, f64::NAN),
        };
        out.push_str(&format!(
            "- {:<8} n={:<5} [{lo:.3}, {hi:.3}] line={:.3} g={:.2}\n",
            truncate(&region.name, 8),
            region.len(),
            region.line.center,
            region.line.lande
        ));
        out.push_str(&format!("  topology: {}\n", region.plan));
        out.push_str(&format!("  order   : {}\n", region.plan.evaluation_order().join(", ")));
    }

    out.push_str("\nAtmospheres:\n");
    for atmosphere in model.atmospheres().iter() {
        out.push_str(&format!(
            "- {} ({}, height {})\n",
            atmosphere.name,
            atmosphere.kind.display_name(),
            atmosphere.height
        ));
        for p in &atmosphere.parameters {
            out.push_str(&format!(
                "    {:<8} {:>12.4} [{:.4}, {:.4}] ±{:.4}\n",
                p.name, p.value, p.min, p.max, p.perturbation
            ));
        }
    }

    let cycles = &model.inversion().cycles;
    if !cycles.is_empty() {
        out.push_str("\nCycles:\n");
        for (i, cycle) in cycles.iter().enumerate() {
            let active: Vec<String> = cycle.active.iter().map(|p| p.to_string()).collect();
            out.push_str(&format!(
                "- {} {:<10} budget={:<4} active=[{}]\n",
                i + 1,
                truncate(&cycle.label, 10),
                model.inversion().budget(i),
                active.join(", ")
            ));
        }
        out.push_str(&format!(
            "Restarts: {} (seed {})\n",
            model.inversion().random_restarts,
            model.inversion().seed
        ));
    }
    out
}

/// Format the run summary printed after `synth` / `invert`.
pub fn format_run_summary(records: &[PixelRecord], distribution: Distribution, top_n: usize) -> String {
    let stats = run_stats(records);
    let mut out = String::new();

    out.push_str("=== sfit - run summary ===\n");
    out.push_str(&format!(
        "Distribution: {}\n",
        match distribution {
            Distribution::Serial => "serial".to_string(),
            Distribution::Distributed { workers } => format!("distributed ({workers} workers)"),
        }
    ));
    out.push_str(&format!(
        "Pixels: {} | synthesized={} inverted={} skipped={} failed={}\n",
        stats.pixels, stats.synthesized, stats.inverted, stats.skipped, stats.failed
    ));
    if stats.inverted > 0 {
        out.push_str(&format!("Converged: {}/{}\n", stats.converged, stats.inverted));
    }
    if let Some((lo, med, hi)) = stats.chi2 {
        out.push_str(&format!("chi2: min={lo:.4e} median={med:.4e} max={hi:.4e}\n"));
    }

    let worst = rank_worst_fits(records, top_n);
    if !worst.is_empty() {
        out.push_str("\nWorst fits:\n");
        out.push_str(&format!("{:>8} {:>14}\n", "pixel", "chi2"));
        out.push_str(&format!("{:->8} {:->14}\n", "", ""));
        for (pixel, chi2) in worst {
            out.push_str(&format!("{pixel:>8} {chi2:>14.6e}\n"));
        }
    }

    let failures: Vec<&PixelRecord> = records
        .iter()
        .filter(|r| matches!(r.output, PixelOutput::Failed(_)))
        .collect();
    if !failures.is_empty() {
        out.push_str("\nFailures:\n");
        for record in failures.iter().take(top_n) {
            if let PixelOutput::Failed(f) = &record.output {
                out.push_str(&format!("{:>8} {:<18} {}\n", record.pixel, f.kind.to_string(), truncate(&f.message, 80)));
            }
        }
        if failures.len() > top_n {
            out.push_str(&format!("... and {} more\n", failures.len() - top_n));
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribute::FailureKind;
    use crate::fit::lm::tests::telluric_model;

    #[test]
    fn summary_counts_statuses() {
        let records = vec![
            PixelRecord {
                pixel: 0,
                output: PixelOutput::Skipped,
            },
            PixelRecord {
                pixel: 1,
                output: PixelOutput::failed(FailureKind::WorkerLost, "worker 1 disconnected"),
            },
        ];
        let text = format_run_summary(&records, Distribution::Distributed { workers: 2 }, 5);
        assert!(text.contains("distributed (2 workers)"));
        assert!(text.contains("skipped=1 failed=1"));
        assert!(text.contains("worker_lost"));
        assert!(!text.contains("Worst fits"));
    }

    #[test]
    fn model_check_shows_plans() {
        let text = format_model(&telluric_model());
        assert!(text.contains("topology: te1"));
        assert!(text.contains("lambda0"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }
}
