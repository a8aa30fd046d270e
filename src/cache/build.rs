//! Cache population.
//!
//! Phase 1 resolves every node carrying a priority tag and ranks them at once.
//! Phase 2 works through the remaining card-bearing nodes in small batches,
//! re-ranking after each, so a large graph never blocks the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::PriorityCache;
use crate::domain::schema::PRIORITY_TAG;
use crate::domain::NodeId;
use crate::error::{Result, ReviewqError};
use crate::id::now_ms;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Wait before phase 2 starts
    pub phase2_delay: Duration,
    pub batch_size: usize,
    /// Pause between phase 2 batches
    pub batch_pause: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            phase2_delay: Duration::from_millis(1000),
            batch_size: 50,
            batch_pause: Duration::from_millis(25),
        }
    }
}

/// Phase 2 work list. Yields batches of node ids; can be stopped and resumed.
#[derive(Debug, Clone)]
pub struct DeferredBuild {
    remaining: VecDeque<NodeId>,
    batch_size: usize,
    processed: usize,
}

impl DeferredBuild {
    pub fn new(ids: impl IntoIterator<Item = NodeId>, batch_size: usize) -> Self {
        Self {
            remaining: ids.into_iter().collect(),
            batch_size: batch_size.max(1),
            processed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Put an unfinished batch back at the front.
    fn requeue(&mut self, batch: Vec<NodeId>) {
        self.processed -= batch.len();
        for id in batch.into_iter().rev() {
            self.remaining.push_front(id);
        }
    }
}

impl Iterator for DeferredBuild {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.batch_size.min(self.remaining.len());
        let batch: Vec<NodeId> = self.remaining.drain(..take).collect();
        self.processed += batch.len();
        Some(batch)
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ReviewqError::Cancelled("deferred cache build".to_string())),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

impl<S: Storage + 'static> PriorityCache<S> {
    /// Phase 1: resolve every tagged node and rank them in one heavy pass.
    ///
    /// Returns the untagged card-bearing nodes left for phase 2.
    pub async fn build(&self, batch_size: usize) -> Result<DeferredBuild> {
        let graph = self.resolver.graph().clone();
        let tagged = graph.nodes_with_tag(PRIORITY_TAG).await?;
        let now = now_ms();

        let mut records = Vec::with_capacity(tagged.len());
        for id in &tagged {
            if let Some(record) = self.resolver.compute_record(id, now).await? {
                records.push(record);
            }
        }
        let total = self.replace_all(records).await?;

        let untagged: Vec<NodeId> = graph
            .nodes_with_review_units()
            .await?
            .into_iter()
            .filter(|id| !tagged.contains(id))
            .collect();

        tracing::info!(tagged = total, deferred = untagged.len(), "cache phase 1 complete");
        Ok(DeferredBuild::new(untagged, batch_size))
    }

    /// Phase 2: resolve deferred nodes batch by batch without writing tags.
    ///
    /// On cancellation the current batch is put back untouched and `Cancelled`
    /// is returned; calling again resumes where it stopped.
    pub async fn run_deferred(
        &self,
        deferred: &mut DeferredBuild,
        options: &BuildOptions,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        pause(options.phase2_delay, cancel).await?;

        let mut merged = 0;
        while let Some(batch) = deferred.next() {
            let now = now_ms();
            let mut records = Vec::with_capacity(batch.len());
            let mut cancelled = false;
            for id in &batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match self.resolver.compute_record(id, now).await {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(node_id = %id, error = %e, "skipping node in deferred build"),
                }
            }
            if cancelled || cancel.is_cancelled() {
                deferred.requeue(batch);
                return Err(ReviewqError::Cancelled("deferred cache build".to_string()));
            }

            merged += records.len();
            self.merge_batch(records).await?;
            tracing::debug!(merged, remaining = deferred.remaining(), "deferred batch merged");

            if !deferred.is_done() {
                pause(options.batch_pause, cancel).await?;
            }
        }

        tracing::info!(merged, "cache phase 2 complete");
        Ok(merged)
    }

    /// Run phase 2 on its own task.
    pub fn spawn_deferred(
        self: &Arc<Self>,
        mut deferred: DeferredBuild,
        options: BuildOptions,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<usize>> {
        let cache = self.clone();
        tokio::spawn(async move { cache.run_deferred(&mut deferred, &options, &cancel).await })
    }

    /// Resolve every candidate in batches, then rank once.
    pub async fn build_optimized(&self, batch_size: usize) -> Result<usize> {
        let candidates = self.candidates().await?;
        let now = now_ms();

        let mut records = Vec::with_capacity(candidates.len());
        for batch in DeferredBuild::new(candidates, batch_size) {
            for id in &batch {
                if let Some(record) = self.resolver.compute_record(id, now).await? {
                    records.push(record);
                }
            }
            tokio::task::yield_now().await;
        }

        let total = self.replace_all(records).await?;
        tracing::info!(total, "optimized cache build complete");
        Ok(total)
    }
}
