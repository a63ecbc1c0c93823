//! Buffered write-back: accumulate per-row deltas and flush them to the store
//! in batches.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::store::{CatalogStore, MovieUpdate};

/// Counters for one enrichment run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichStats {
    pub attempted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct BatchUpsertSink {
    store: Arc<dyn CatalogStore>,
    batch: Vec<MovieUpdate>,
    batch_size: usize,
    dry_run: bool,
    stats: EnrichStats,
}

impl BatchUpsertSink {
    pub fn new(store: Arc<dyn CatalogStore>, batch_size: usize, dry_run: bool) -> Self {
        Self {
            store,
            batch: Vec::with_capacity(batch_size.max(1)),
            batch_size: batch_size.max(1),
            dry_run,
            stats: EnrichStats::default(),
        }
    }

    pub fn record_attempt(&mut self) {
        self.stats.attempted += 1;
    }

    pub fn record_skip(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn record_failure(&mut self) {
        self.stats.failed += 1;
    }

    /// Queue one delta; flushes when the batch reaches its threshold.
    pub async fn push(&mut self, update: MovieUpdate) -> Result<()> {
        self.batch.push(update);
        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write out whatever is buffered. Safe to call with an empty buffer, so
    /// a final drain after the pipeline ends is always valid.
    pub async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        if self.dry_run {
            info!(count = batch.len(), "dry-run: skipping batch write");
            self.stats.skipped += batch.len() as u64;
            return Ok(());
        }
        let applied = self
            .store
            .bulk_apply(&batch)
            .await
            .context("batch write failed")?;
        debug!(queued = batch.len(), applied, "flushed batch");
        self.stats.updated += applied;
        Ok(())
    }

    pub fn stats(&self) -> EnrichStats {
        self.stats
    }

    pub fn into_stats(self) -> EnrichStats {
        self.stats
    }
}
