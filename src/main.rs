mod cli;
mod commands;
mod engine;
mod errors;
mod extract;
mod labels;
mod matcher;
mod model;
mod report;
mod rules;
mod taint;
mod utils;
mod walk;

use crate::errors::SnareResult;
use crate::utils::Config;
use clap::Parser;
use cli::Cli;
use console::style;
use directories::ProjectDirs;
use std::fs;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

fn init_tracing(json: bool) {
    let registry = Registry::default().with(EnvFilter::from_default_env());

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_timer(time::UtcTime::rfc_3339());
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_timer(time::UtcTime::rfc_3339());
        registry.with(fmt_layer).init();
    }
}

fn run(cli: Cli) -> SnareResult<ExitCode> {
    let now = Instant::now();

    let proj_dirs = ProjectDirs::from("dev", "snare", "snare")
        .ok_or("Unable to determine project directories")?;

    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;

    let config = Config::load(config_dir, cli.config.as_deref())?;
    let quiet = config.output.quiet;

    rayon::ThreadPoolBuilder::new()
        .stack_size(config.performance.rayon_thread_stack_size)
        .num_threads(config.performance.worker_threads.unwrap_or(0))
        .build_global()
        .map_err(|e| errors::SnareError::Other(format!("cannot start worker pool: {e}")))?;

    let code = commands::handle_command(cli.command, config)?;

    if !quiet {
        eprintln!(
            "{} in {:.3}s.",
            style("Finished").green().bold(),
            now.elapsed().as_secs_f32()
        );
    }
    Ok(code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    tracing::debug!("CLI starting up");

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {e}", style("error").red().bold());
            ExitCode::from(2)
        }
    }
}
