// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use hypoloc::assemble::{summarize_station_residuals, ArchiveRecord, StationResidualSummary};
use hypoloc::io;
use hypoloc::{Locator, SolveResult};

#[derive(Parser)]
#[command(name = "hypoloc", about = "Layered-crust earthquake locator")]
struct Cli {
    /// Run file with control, layers, stations and events (.toml or .json)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output file for results (.json); printed to stdout when absent
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Also write an archive record with inputs and hypocenters (.json)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Serialize)]
struct Report {
    results: Vec<SolveResult>,
    failures: Vec<Failure>,
    station_residuals: Vec<StationResidualSummary>,
}

#[derive(Serialize)]
struct Failure {
    label: String,
    error: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let run = io::load_run(&cli.input)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    if run.events.is_empty() {
        bail!("{} contains no events", cli.input.display());
    }

    let model = run.model().context("invalid velocity layers")?;
    let roster = run.roster().context("invalid station list")?;
    let mut locator = Locator::new(&model, &roster, &run.control).context("invalid run control")?;
    if let Some(threads) = cli.threads {
        locator = locator.with_threads(threads);
    }

    let outcomes = locator.locate_batch(&run.events)?;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (event, outcome) in run.events.iter().zip(outcomes) {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => failures.push(Failure {
                label: event.label.clone(),
                error: e.to_string(),
            }),
        }
    }
    tracing::info!(
        located = results.len(),
        failed = failures.len(),
        "batch complete"
    );

    if let Some(path) = &cli.archive {
        let hypocenters: Vec<_> = results
            .iter()
            .flat_map(|r| r.hypocenters.iter().cloned())
            .collect();
        let phases: Vec<_> = run
            .events
            .iter()
            .flat_map(|e| e.phases.iter().cloned())
            .collect();
        let archive =
            ArchiveRecord::new(&run.control, &run.layers, &run.stations, &phases, &hypocenters);
        io::save_json(path, &archive)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let station_residuals = summarize_station_residuals(&results, run.control.min_summary_quality);
    let report = Report {
        results,
        failures,
        station_residuals,
    };

    match &cli.output {
        Some(path) => io::save_json(path, &report)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}
