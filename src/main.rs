mod aligner;
mod config;
mod error;
mod models;
mod pipeline;
mod planner;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::{DateStatus, Pipeline};
use crate::planner::plan_dates;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "qt-ingest", about = "queue-times.com wait-time ingestion", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and ingest every pending park/date in the configured window
    Run,

    /// Show pending dates per park without touching the network
    Plan,

    /// Show database statistics
    Stats,

    /// Write queue_data joined with ride names as CSV
    Export {
        /// Output file
        #[arg(short, long, default_value = "data/queue_data.csv")]
        out: PathBuf,

        /// Only this park
        #[arg(short, long)]
        park: Option<String>,
    },

    /// Apply schema migrations without ingesting
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "qt_ingest=info,warn",
        1 => "qt_ingest=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(filter)
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            let _t = utils::Timer::start("Ingestion run");
            match Pipeline::new(config).run().await {
                Ok(summary) => {
                    info!(
                        "Done: {} parks, {} dates stored, {} skipped, {} failed, {} samples",
                        summary.parks_processed,
                        summary.dates_stored,
                        summary.dates_skipped,
                        summary.dates_failed,
                        utils::fmt_number(summary.samples_inserted)
                    );
                    if summary.parks_failed > 0 {
                        error!("{} parks could not be planned", summary.parks_failed);
                    }
                    for report in &summary.reports {
                        if let DateStatus::Failed(reason) = &report.status {
                            error!("  park {} on {}: {}", report.park_id, report.date, reason);
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Run aborted: {}", e);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Plan => {
            let candidates = config.validate()?;
            let repo = open_repo(&config)?;
            println!("{} candidate dates in window", candidates.len());
            for park_id in config.ingest.park_ids.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
                let existing = repo
                    .existing_dates(park_id)
                    .with_context(|| format!("reading stored dates for park {}", park_id))?;
                let pending = plan_dates(&candidates, &existing);
                match (pending.first(), pending.last()) {
                    (Some(first), Some(last)) => println!(
                        "  park {:>4}: {:>5} pending ({} → {}), {} stored",
                        park_id,
                        pending.len(),
                        first,
                        last,
                        existing.len()
                    ),
                    _ => println!("  park {:>4}: up to date, {} stored", park_id, existing.len()),
                }
            }
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let samples = repo.sample_count()?;
            let coverage = repo.park_coverage()?;
            println!("─────────────────────────────────────────────");
            println!("  Queue times: database stats");
            println!("─────────────────────────────────────────────");
            println!("  Samples  : {}", utils::fmt_number(samples));
            println!("  Parks    : {}", coverage.len());
            for park in &coverage {
                println!(
                    "  park {:>4}: {:>4} rides, {:>5} days, {} → {}",
                    park.park_id,
                    park.rides,
                    utils::fmt_number(park.days),
                    park.first.as_deref().unwrap_or("—"),
                    park.last.as_deref().unwrap_or("—"),
                );
            }
            if let Some(run) = repo.last_run()? {
                match run.error {
                    Some(error) => println!("  Last run : {} ({})", run.status, error),
                    None => println!("  Last run : {}", run.status),
                }
            }
            println!("─────────────────────────────────────────────");
        }

        Command::Export { out, park } => {
            let _t = utils::Timer::start("CSV export");
            let repo = open_repo(&config)?;
            let rows = repo.export_rows(park.as_deref())?;
            if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
            }
            let mut writer = csv::Writer::from_path(&out).with_context(|| format!("opening {:?}", out))?;
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            info!("Wrote {} rows to {:?}", utils::fmt_number(rows.len()), out);
        }

        Command::Migrate => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            repo.close()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}
