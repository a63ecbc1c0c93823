use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cinematch_enrich::merge::OverwriteFlags;
use cinematch_enrich::orchestrator::{run_enrichment, RunOptions};
use cinematch_enrich::provider::retry::RetryPolicy;
use cinematch_enrich::provider::{TmdbClient, TmdbConfig};
use cinematch_enrich::store::Db;
use cinematch_enrich::util::env::{database_url, env_parse, env_req, init_env, redact_dsn};

/// Enrich catalog rows with TMDB metadata.
#[derive(Parser, Debug)]
#[command(name = "enrich", about = "Backfill movie metadata from TMDB")]
struct Cli {
    /// Maximum number of rows to process this run.
    #[arg(long, default_value_t = 500)]
    limit: i64,

    /// Only rows missing at least one enrichable field.
    #[arg(long)]
    only_missing: bool,

    /// Only rows that already have a provider id but lack poster/overview.
    #[arg(long)]
    ids_only: bool,

    /// Replace existing poster paths.
    #[arg(long)]
    overwrite_posters: bool,

    /// Replace existing overviews.
    #[arg(long)]
    overwrite_overview: bool,

    /// Replace existing years.
    #[arg(long)]
    overwrite_year: bool,

    /// Replace existing genre lists.
    #[arg(long)]
    overwrite_genres: bool,

    /// Aggregate provider request rate.
    #[arg(long, default_value_t = 4)]
    requests_per_second: u32,

    /// Rows resolved concurrently.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Updates per database write.
    #[arg(long, default_value_t = 200)]
    batch_size: usize,

    /// Log a progress line every N processed rows (0 disables).
    #[arg(long, default_value_t = 50)]
    progress_every: u64,

    /// Resolve and merge but write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Override the database connection string from the environment.
    #[arg(long)]
    db_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let cli = Cli::parse();

    let api_key = env_req("TMDB_API_KEY")?;
    let dsn = match cli.db_url.clone() {
        Some(url) => url,
        None => database_url()?,
    };
    info!(db = %redact_dsn(&dsn), "resolved database target");

    let store = Arc::new(Db::connect(&dsn).await.context("database setup failed")?);

    let mut cfg = TmdbConfig::new(api_key);
    cfg.rps = cli.requests_per_second;
    cfg.retry = RetryPolicy {
        max_attempts: env_parse("TMDB_MAX_RETRIES", 5),
        ..RetryPolicy::default()
    };
    let provider = Arc::new(TmdbClient::new(cfg).context("provider setup failed")?);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight rows");
            let _ = cancel_tx.send(true);
        }
    });

    let opts = RunOptions {
        limit: cli.limit,
        only_missing: cli.only_missing,
        ids_only: cli.ids_only,
        overwrite: OverwriteFlags {
            posters: cli.overwrite_posters,
            overview: cli.overwrite_overview,
            year: cli.overwrite_year,
            genres: cli.overwrite_genres,
        },
        concurrency: cli.concurrency,
        batch_size: cli.batch_size,
        dry_run: cli.dry_run,
        progress_every: cli.progress_every,
    };

    let stats = run_enrichment(store, provider, opts, cancel_rx).await?;
    info!(
        attempted = stats.attempted,
        updated = stats.updated,
        skipped = stats.skipped,
        failed = stats.failed,
        "done"
    );
    Ok(())
}
