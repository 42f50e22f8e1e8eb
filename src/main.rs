//! CLI entry point for the contracts backfill.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use backfill_core::{
    AttemptRunner, BackfillDriver, BackfillError, BackfillLedger, CommandExporter,
    PartitionEngine, RetryPolicy, TokioSleeper,
};
use clap::Parser;
use tracing::{debug, error, info, warn};

mod cli;
mod config;

use cli::Args;
use config::{RunSettings, default_log_level, load_file_config};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = load_file_config(args.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_log_level(&args, &file_config)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    let settings = RunSettings::resolve(&args, &file_config);
    debug!(?settings, "resolved settings");

    info!(
        start = %args.global_start_date,
        end = %args.global_end_date,
        retries = settings.max_retries,
        "Backfill starting"
    );

    let ledger = match &settings.ledger_path {
        Some(path) => BackfillLedger::load(path)
            .with_context(|| format!("Failed to load ledger '{}'", path.display()))?,
        None => BackfillLedger::new(),
    };
    if !ledger.is_empty() {
        info!(outcomes = ledger.len(), "resuming from ledger");
    }

    let exporter = CommandExporter::new(&settings.export_command, &settings.output_dir)
        .with_args(settings.export_args.clone())
        .with_timeout(settings.export_timeout)
        .with_row_limit(settings.row_limit);
    let sleeper = Arc::new(TokioSleeper);
    let runner = AttemptRunner::new(
        Arc::new(exporter),
        sleeper.clone(),
        RetryPolicy::new(settings.max_retries, settings.retry_delay),
    );

    let mut driver = BackfillDriver::new(PartitionEngine::new(runner), sleeper)
        .with_month_delay(settings.month_delay);
    if let Some(path) = &settings.ledger_path {
        driver = driver.with_ledger_path(path);
    }

    let report = match driver
        .run(args.global_start_date, args.global_end_date, ledger)
        .await
    {
        Ok(report) => report,
        Err(BackfillError::InvalidRange(e)) => {
            error!(error = %e, "Global start date cannot be after global end date");
            return Ok(ExitCode::FAILURE);
        }
    };

    for outcome in report.ledger.incomplete_days() {
        warn!(
            file = %outcome.node.file_name(),
            detail = %outcome.result.describe(),
            "day export is incomplete"
        );
    }

    info!(
        complete_months = report.complete_months(),
        partial_months = report.partial_months(),
        "Backfill complete"
    );

    if let Some(abort) = &report.aborted {
        error!(month = %abort.month, cause = %abort.cause, "Backfill stopped early");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
