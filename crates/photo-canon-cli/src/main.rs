mod commands;
mod logging;
mod progress;

use std::process;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use photo_canon_core::{load_configuration, Error, Pipeline};
use progress::CliReporter;
use tracing::{error, info, warn};

/// Bad configuration or missing inputs; nothing was written.
const EXIT_CONFIGURATION: i32 = 1;
/// A stage ran and failed, or a store check found problems.
const EXIT_FAILURE: i32 = 2;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Cli::parse();

    let _guard = logging::init_logger(
        args.command.as_ref().map_or("help", Commands::name),
        args.run_label.as_deref(),
    );

    let mut config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(EXIT_CONFIGURATION);
        }
    };
    if let Some(label) = args.run_label {
        config.run_label = label;
    }

    let command = match args.command {
        Some(command) => command,
        None => {
            let _ = Cli::command().print_long_help();
            return Ok(());
        }
    };

    if let Commands::PrintConfig = command {
        println!("Configuration: {:#?}", config);
        return Ok(());
    }

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            process::exit(EXIT_CONFIGURATION);
        }
    };

    let outcome = match command {
        Commands::Plan => run_plan(&pipeline),
        Commands::Materialize => run_materialize(&pipeline),
        Commands::Sidecars => run_sidecars(&pipeline),
        Commands::Run => run_plan(&pipeline)
            .and_then(|_| run_materialize(&pipeline))
            .and_then(|_| run_sidecars(&pipeline)),
        Commands::Inventory => run_inventory(&pipeline),
        Commands::CheckStore => run_check_store(&pipeline),
        Commands::VerifyStore => run_verify_store(&pipeline),
        Commands::PrintConfig => Ok(()),
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        let is_configuration = err
            .downcast_ref::<Error>()
            .is_some_and(Error::is_configuration);
        process::exit(if is_configuration {
            EXIT_CONFIGURATION
        } else {
            EXIT_FAILURE
        });
    }

    Ok(())
}

fn run_plan(pipeline: &Pipeline) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let result = pipeline.plan(&reporter)?;

    println!();
    info!(
        "Scan: {}, Hash: {}",
        format!("{:.2}s", result.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.hash_duration.as_secs_f64()).green(),
    );
    info!(
        "{} media files: {} unique, {} duplicates, {} already in store, {} unreadable",
        format!("{}", result.files_scanned).cyan(),
        format!("{}", result.unique).green(),
        format!("{}", result.duplicates).yellow(),
        format!("{}", result.already_present).cyan(),
        format!("{}", result.unreadable).red(),
    );
    if result.skipped_non_utf8 > 0 {
        warn!(
            "{} media files skipped because their paths are not valid UTF-8",
            format!("{}", result.skipped_non_utf8).red(),
        );
    }
    info!("Manifest: {}", result.manifest_dir.display());
    Ok(())
}

fn run_materialize(pipeline: &Pipeline) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let summary = pipeline
        .materialize(&reporter)
        .context("materializing the store")?;

    println!();
    info!(
        "{} copied, {} already present, {} missing sources, {} changed since planning, {} failed, {} junk files purged",
        format!("{}", summary.copied).green(),
        format!("{}", summary.skipped_existing).cyan(),
        format!("{}", summary.missing_source).yellow(),
        format!("{}", summary.mismatched).yellow(),
        format!("{}", summary.failed).red(),
        format!("{}", summary.purged_junk).cyan(),
    );
    Ok(())
}

fn run_sidecars(pipeline: &Pipeline) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let summary = pipeline
        .write_sidecars(&reporter, Utc::now())
        .context("writing sidecars")?;

    println!();
    info!(
        "{} sidecars written ({} provenance only), {} skipped for missing media",
        format!("{}", summary.written).green(),
        format!("{}", summary.no_metadata).yellow(),
        format!("{}", summary.skipped_missing_media).yellow(),
    );
    info!(
        "{} unparsable candidates, {} ambiguous lookups, {} failed lookups, {} failed writes",
        format!("{}", summary.unparsable).yellow(),
        format!("{}", summary.ambiguous).yellow(),
        format!("{}", summary.lookup_failed).red(),
        format!("{}", summary.failed).red(),
    );
    Ok(())
}

fn run_inventory(pipeline: &Pipeline) -> anyhow::Result<()> {
    let result = pipeline.inventory(Utc::now())?;
    info!(
        "{} store entries, {} bytes, written to {}",
        format!("{}", result.entries).green(),
        format!("{}", result.total_bytes).cyan(),
        result.path.display()
    );
    Ok(())
}

fn run_check_store(pipeline: &Pipeline) -> anyhow::Result<()> {
    let health = pipeline.check_store()?;
    for path in &health.junk {
        warn!("Junk file in store: {}", path.display());
    }
    for path in &health.partials {
        warn!("Leftover partial copy in store: {}", path.display());
    }
    if !health.is_clean() {
        bail!(
            "store {} is not clean ({} junk, {} partial files listed)",
            pipeline.store().root().display(),
            health.junk.len(),
            health.partials.len()
        );
    }
    info!("Store {} is {}", pipeline.store().root().display(), "clean".green());
    Ok(())
}

fn run_verify_store(pipeline: &Pipeline) -> anyhow::Result<()> {
    let report = pipeline.verify_store()?;
    for path in &report.mismatched {
        error!("Content does not match name: {}", path.display());
    }
    info!(
        "{} entries checked: {} mismatched, {} unreadable, {} without sidecar",
        format!("{}", report.checked).cyan(),
        format!("{}", report.mismatched.len()).red(),
        format!("{}", report.unreadable.len()).red(),
        format!("{}", report.missing_sidecar.len()).yellow(),
    );
    if !report.is_ok() {
        bail!("store verification failed");
    }
    Ok(())
}
