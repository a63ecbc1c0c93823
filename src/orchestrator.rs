//! Run coordination: fan candidate rows out across a bounded set of resolver
//! tasks, funnel the deltas into the batch sink, and drain cleanly on
//! cancellation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::merge::{self, OverwriteFlags};
use crate::provider::{MetadataProvider, ProviderError};
use crate::resolver::IdentityResolver;
use crate::sink::{BatchUpsertSink, EnrichStats};
use crate::store::{CandidateSelection, CatalogStore, MovieUpdate};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limit: i64,
    pub only_missing: bool,
    pub ids_only: bool,
    pub overwrite: OverwriteFlags,
    pub concurrency: usize,
    pub batch_size: usize,
    pub dry_run: bool,
    pub progress_every: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: 500,
            only_missing: false,
            ids_only: false,
            overwrite: OverwriteFlags::default(),
            concurrency: 8,
            batch_size: 200,
            dry_run: false,
            progress_every: 50,
        }
    }
}

/// Drive one enrichment run to completion.
///
/// Rows are resolved concurrently up to `opts.concurrency`, but all writes go
/// through a single sink so batches stay ordered and bounded. A cancellation
/// signal stops new dispatch; in-flight lookups finish and their results are
/// still flushed.
pub async fn run_enrichment(
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn MetadataProvider>,
    opts: RunOptions,
    mut cancel: watch::Receiver<bool>,
) -> Result<EnrichStats> {
    let selection = CandidateSelection::from_flags(opts.only_missing, opts.ids_only);
    let records = store
        .fetch_candidates(opts.limit, selection)
        .await
        .context("failed to load candidates")?;
    info!(
        candidates = records.len(),
        ?selection,
        dry_run = opts.dry_run,
        "starting enrichment run"
    );

    let resolver = IdentityResolver::new(provider);
    let mut sink = BatchUpsertSink::new(store, opts.batch_size, opts.dry_run);

    let mut seen: HashSet<i64> = HashSet::new();
    let mut queue: VecDeque<_> = records
        .into_iter()
        .filter(|r| seen.insert(r.movie_id))
        .collect();

    let concurrency = opts.concurrency.max(1);
    let mut tasks: JoinSet<(i64, Result<Option<MovieUpdate>, ProviderError>)> = JoinSet::new();
    let mut cancelled = *cancel.borrow();
    let mut cancel_closed = false;
    let mut processed = 0u64;

    loop {
        // Top up the in-flight set; completed tasks below free slots.
        while !cancelled && tasks.len() < concurrency {
            let Some(record) = queue.pop_front() else { break };
            sink.record_attempt();
            let resolver = resolver.clone();
            let flags = opts.overwrite;
            tasks.spawn(async move {
                let movie_id = record.movie_id;
                let outcome = match resolver.resolve(&record).await {
                    Ok(Some(detail)) => Ok(merge::merge(&record, &detail, flags)),
                    Ok(None) => Ok(None),
                    Err(err) => Err(err),
                };
                (movie_id, outcome)
            });
        }
        if tasks.is_empty() {
            break;
        }

        tokio::select! {
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok((movie_id, outcome))) => {
                        processed += 1;
                        match outcome {
                            Ok(Some(update)) => sink.push(update).await?,
                            Ok(None) => sink.record_skip(),
                            Err(err) => {
                                warn!(movie_id, error = %err, "row failed");
                                sink.record_failure();
                            }
                        }
                        if opts.progress_every > 0 && processed % opts.progress_every == 0 {
                            let s = sink.stats();
                            info!(
                                processed,
                                updated = s.updated,
                                skipped = s.skipped,
                                failed = s.failed,
                                "progress"
                            );
                        }
                    }
                    Some(Err(join_err)) => {
                        error!(error = %join_err, "resolver task panicked");
                        sink.record_failure();
                    }
                    None => {}
                }
            }
            changed = cancel.changed(), if !cancelled && !cancel_closed => {
                match changed {
                    Ok(()) => {
                        if *cancel.borrow_and_update() {
                            cancelled = true;
                            info!("cancellation requested; draining in-flight work");
                        }
                    }
                    Err(_) => cancel_closed = true,
                }
            }
        }
    }

    sink.flush().await.context("final flush failed")?;
    let stats = sink.into_stats();
    info!(
        attempted = stats.attempted,
        updated = stats.updated,
        skipped = stats.skipped,
        failed = stats.failed,
        "enrichment run complete"
    );
    Ok(stats)
}
