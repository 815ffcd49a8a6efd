//! Command-line parsing for the Stokes synthesis/inversion driver.
//!
//! Argument parsing and command dispatch are kept apart from the modeling code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DistributionOverrides;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sfit", version, about = "Multi-atmosphere Stokes synthesis and inversion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a run configuration and print the sealed model.
    Check(CheckArgs),
    /// Synthesize Stokes profiles for every pixel.
    Synth(SynthArgs),
    /// Invert observed Stokes profiles pixel by pixel.
    Invert(InvertArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Run configuration (JSON).
    #[arg(short, long, value_name = "JSON")]
    pub config: PathBuf,
}

/// Worker options shared by `synth` and `invert`.
#[derive(Debug, Args, Clone, Default)]
pub struct WorkerArgs {
    /// Number of worker threads (overrides the config file and SFIT_WORKERS).
    #[arg(short = 'j', long, conflicts_with = "serial")]
    pub workers: Option<usize>,

    /// Process pixels in the calling thread.
    #[arg(long)]
    pub serial: bool,
}

impl WorkerArgs {
    pub fn overrides(&self) -> DistributionOverrides {
        DistributionOverrides {
            serial: self.serial,
            workers: self.workers,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Run configuration (JSON).
    #[arg(short, long, value_name = "JSON")]
    pub config: PathBuf,

    /// Pixel file supplying geometry and parameter overrides.
    #[arg(long, value_name = "JSON", conflicts_with = "pixels")]
    pub observations: Option<PathBuf>,

    /// Number of default pixels when no pixel file is given.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub pixels: usize,

    /// Write per-pixel results to JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    /// Write the synthesized spectra as an observation file.
    #[arg(long = "export-observations", value_name = "JSON")]
    pub export_observations: Option<PathBuf>,

    /// Gaussian noise level added to exported spectra.
    #[arg(long, default_value_t = 0.0, requires = "export_observations")]
    pub noise: f64,

    /// Noise seed.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[command(flatten)]
    pub workers: WorkerArgs,

    /// Rows shown in the failure table.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Args, Clone)]
pub struct InvertArgs {
    /// Run configuration (JSON).
    #[arg(short, long, value_name = "JSON")]
    pub config: PathBuf,

    /// Observation file.
    #[arg(long, value_name = "JSON")]
    pub observations: PathBuf,

    /// Write per-pixel results to JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    /// Write a one-row-per-pixel CSV summary.
    #[arg(long, value_name = "CSV")]
    pub summary: Option<PathBuf>,

    /// Override the number of random restarts.
    #[arg(long)]
    pub restarts: Option<usize>,

    /// Override the restart seed.
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub workers: WorkerArgs,

    /// Rows shown in the worst-fit and failure tables.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invert_with_overrides() {
        let cli = Cli::try_parse_from([
            "sfit",
            "invert",
            "--config",
            "run.json",
            "--observations",
            "obs.json",
            "--restarts",
            "3",
            "-j",
            "4",
        ])
        .unwrap();
        let Command::Invert(args) = cli.command else {
            panic!("expected invert");
        };
        assert_eq!(args.restarts, Some(3));
        assert_eq!(
            args.workers.overrides(),
            DistributionOverrides {
                serial: false,
                workers: Some(4)
            }
        );
    }

    #[test]
    fn serial_conflicts_with_workers() {
        let err = Cli::try_parse_from(["sfit", "synth", "-c", "run.json", "--serial", "-j", "2"]);
        assert!(err.is_err());
    }

    #[test]
    fn noise_needs_export_path() {
        assert!(Cli::try_parse_from(["sfit", "synth", "-c", "run.json", "--noise", "0.01"]).is_err());
        assert!(
            Cli::try_parse_from([
                "sfit",
                "synth",
                "-c",
                "run.json",
                "--noise",
                "0.01",
                "--export-observations",
                "obs.json"
            ])
            .is_ok()
        );
    }
}
