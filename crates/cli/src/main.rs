//! quorum — backfill meeting documents from the source-of-record API.
//!
//! Exit code 0 when every selected job reaches `completed`; 1 when any
//! selected job ends in another state. `--status` is read-only and
//! always exits 0.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use quorum_backfill::{JobFilter, Orchestrator, Scheduler};
use quorum_core::{DocumentKind, JobKey};
use quorum_source::HttpSourceClient;
use quorum_store::PgStore;

use crate::config::AppConfig;

/// Checkpointed, resumable backfill of paginated meeting documents.
#[derive(Parser, Debug)]
#[command(name = "quorum", version, about)]
struct Cli {
    /// Entity key to backfill, or "all" for every known job.
    #[arg(long, default_value = "all")]
    target: String,

    /// Only resume jobs that previously failed or were paused.
    #[arg(long)]
    resume: bool,

    /// Recompute the verification comparison without fetching.
    #[arg(long)]
    verify_only: bool,

    /// Rows per fetch call (overrides the config file).
    #[arg(long)]
    batch_size: Option<u32>,

    /// Concurrent jobs (overrides the config file).
    #[arg(long)]
    workers: Option<usize>,

    /// Document kinds to process, comma-separated. Default: all kinds.
    #[arg(long, value_delimiter = ',')]
    kinds: Vec<DocumentKind>,

    /// Print the job table and exit.
    #[arg(long)]
    status: bool,

    /// Path to quorum.toml config file.
    #[arg(long, env = "QUORUM_CONFIG", default_value = "config/quorum.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();
    let config = AppConfig::load(&args.config).context("failed to load configuration")?;

    let mut backfill = config.backfill.clone();
    if let Some(batch_size) = args.batch_size {
        backfill.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        backfill.workers = workers;
    }

    let store = Arc::new(
        PgStore::connect(&config.resolve_database_url()?)
            .await
            .context("failed to connect to the document store")?,
    );

    if args.status {
        print_status(store.as_ref()).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let source = Arc::new(
        HttpSourceClient::new(&config.source, backfill.fetch_timeout())
            .context("failed to build source client")?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        source,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        backfill.clone(),
    ));
    let scheduler = Scheduler::new(orchestrator, Arc::clone(&store) as _, backfill.workers);

    // A concrete target gets its job records created up front; "all" only
    // touches jobs that already exist.
    if args.target != "all" {
        let kinds = if args.kinds.is_empty() {
            DocumentKind::ALL.to_vec()
        } else {
            args.kinds.clone()
        };
        for kind in kinds {
            scheduler
                .enqueue(JobKey::new(args.target.clone(), kind))
                .await?;
        }
    }

    let filter = JobFilter {
        entity: (args.target != "all").then(|| args.target.clone()),
        kinds: args.kinds.clone(),
        resume_only: args.resume,
        verify_only: args.verify_only,
    };

    let summary = scheduler.run_eligible(&filter).await?;

    for job in &summary.jobs {
        info!(
            job = %job.key(),
            status = %job.status,
            fetched = job.pages_fetched,
            created = job.pages_created,
            updated = job.pages_updated,
            errors = job.errors_encountered,
            "final state"
        );
    }

    if summary.jobs.is_empty() {
        info!("no eligible jobs matched the selection");
    }

    if summary.all_completed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Operator-facing dump of every job record.
async fn print_status(store: &PgStore) -> Result<()> {
    use quorum_store::CheckpointStore;

    let jobs = store.list().await?;
    if jobs.is_empty() {
        println!("no backfill jobs recorded");
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:<10} {:>8} {:>8} {:>8} {:>7} {:>9} {:>9}  {}",
        "ENTITY", "KIND", "STATUS", "FETCHED", "CREATED", "UPDATED", "ERRORS", "EXPECTED", "ACTUAL", "LAST ERROR"
    );
    for job in jobs {
        println!(
            "{:<24} {:<12} {:<10} {:>8} {:>8} {:>8} {:>7} {:>9} {:>9}  {}",
            job.entity_key,
            job.kind.as_str(),
            job.status.as_str(),
            job.pages_fetched,
            job.pages_created,
            job.pages_updated,
            job.errors_encountered,
            job.expected_count.map_or_else(|| "-".into(), |n| n.to_string()),
            job.actual_count.map_or_else(|| "-".into(), |n| n.to_string()),
            job.last_error,
        );
    }
    Ok(())
}
