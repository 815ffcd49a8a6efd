//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - runs the pixel pipeline
//! - prints the summary and writes the requested files

use clap::Parser;

use crate::cli::{CheckArgs, Cli, Command, InvertArgs, SynthArgs};
use crate::config::RunConfig;
use crate::domain::WorkingMode;
use crate::error::AppError;
use crate::io::{read_observations, write_observations, write_results_json, write_summary_csv};

pub mod pipeline;

/// Entry point for the `sfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check(args) => handle_check(args),
        Command::Synth(args) => handle_synth(args),
        Command::Invert(args) => handle_invert(args),
    }
}

fn handle_check(args: CheckArgs) -> Result<(), AppError> {
    let config = RunConfig::load(&args.config)?;
    let model = config.build_model()?;
    println!("{}", crate::report::format_model(&model));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = RunConfig::load(&args.config)?;
    let tasks = match &args.observations {
        Some(path) => read_observations(path)?.into_tasks(),
        None => pipeline::default_tasks(args.pixels),
    };

    let run = pipeline::run_pixels(&config, WorkingMode::Synthesis, tasks, args.workers.overrides())?;
    println!(
        "{}",
        crate::report::format_run_summary(&run.records, run.distribution, args.top)
    );

    if let Some(path) = &args.output {
        write_results_json(path, WorkingMode::Synthesis, &run.records)?;
        log::info!("wrote results to {}", path.display());
    }
    if let Some(path) = &args.export_observations {
        let file = pipeline::synthetic_observations(&run, args.noise, args.seed);
        write_observations(path, &file)?;
        log::info!("wrote {} synthetic pixels to {}", file.pixels.len(), path.display());
    }
    Ok(())
}

fn handle_invert(args: InvertArgs) -> Result<(), AppError> {
    let mut config = RunConfig::load(&args.config)?;
    pipeline::apply_inversion_overrides(&mut config, args.restarts, args.seed);
    let tasks = read_observations(&args.observations)?.into_tasks();

    let run = pipeline::run_pixels(&config, WorkingMode::Inversion, tasks, args.workers.overrides())?;
    println!(
        "{}",
        crate::report::format_run_summary(&run.records, run.distribution, args.top)
    );
    log::debug!("inversion wall time {:.2}s", run.elapsed.as_secs_f64());

    if let Some(path) = &args.output {
        write_results_json(path, WorkingMode::Inversion, &run.records)?;
        log::info!("wrote results to {}", path.display());
    }
    if let Some(path) = &args.summary {
        write_summary_csv(path, &run.model, &run.records)?;
        log::info!("wrote summary to {}", path.display());
    }
    Ok(())
}
