//! Percentile-ranked priority cache.
//!
//! Holds one [`PriorityRecord`] per card-bearing or prioritized node. Writes are
//! queued through [`PriorityCache::update_cache`] and applied by a flush, either
//! when the debounce window passes or when a caller forces it.
//!
//! Flushes come in two weights:
//! - light: patch records in place, keep the previous percentiles (marked stale)
//! - heavy: stable sort by priority and re-rank every record

mod build;
mod debounce;
mod patch;

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub use build::{BuildOptions, DeferredBuild};
pub use debounce::{DEFAULT_DEBOUNCE, DebounceController, DebounceMsg, run_debounce};
pub use patch::{Patch, PendingUpdate};

use crate::domain::schema::PRIORITY_TAG;
use crate::domain::{NodeId, PriorityRecord, ScopeSet};
use crate::error::Result;
use crate::id::now_ms;
use crate::priority::{PriorityResolver, read_record, record_for};
use crate::storage::{HasId, Storage};

/// Session-tier collection holding the cache snapshot
pub const CACHE_COLLECTION: &str = "priority_cache";
const SNAPSHOT_ID: &str = "snapshot";

/// Volume percentile of 0-based rank `index` among `n` items.
pub fn percentile_rank(index: usize, n: usize) -> u8 {
    if n == 0 {
        return 100;
    }
    (((index + 1) as f64 / n as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Stable-sort records by priority and assign fresh percentiles.
pub fn recompute_percentiles(records: &mut [PriorityRecord]) {
    records.sort_by_key(|r| r.priority);
    let n = records.len();
    for (i, record) in records.iter_mut().enumerate() {
        record.kb_percentile = Some(percentile_rank(i, n));
        record.percentile_stale = false;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheSnapshot {
    id: String,
    updated_at: i64,
    records: Vec<PriorityRecord>,
}

impl HasId for CacheSnapshot {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushOutcome {
    /// Pending updates applied
    pub applied: usize,
    pub heavy: bool,
}

pub struct PriorityCache<S: Storage> {
    resolver: Arc<PriorityResolver>,
    session: Arc<S>,
    records: Mutex<Vec<PriorityRecord>>,
    debounce: DebounceController,
}

impl<S: Storage + 'static> PriorityCache<S> {
    /// Create the cache and spawn its debounce task. Must run inside a tokio runtime.
    ///
    /// A snapshot already present in the session store is picked up.
    pub fn new(resolver: Arc<PriorityResolver>, session: Arc<S>, window: Duration) -> Arc<Self> {
        let records = load_snapshot(session.as_ref());

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let (debounce, rx) = DebounceController::new();
            let weak = weak.clone();
            tokio::spawn(run_debounce(rx, window, move || {
                let weak = weak.clone();
                async move {
                    if let Some(cache) = weak.upgrade()
                        && let Err(e) = cache.flush_now(false).await
                    {
                        tracing::warn!(error = %e, "debounced flush failed");
                    }
                }
            }));

            Self {
                resolver,
                session,
                records: Mutex::new(records),
                debounce,
            }
        })
    }

    pub fn resolver(&self) -> &Arc<PriorityResolver> {
        &self.resolver
    }

    /// Queue an update for `node_id` and restart the debounce window.
    pub fn update_cache(&self, node_id: &str, is_light: bool, patch: Patch) -> Result<()> {
        tracing::trace!(node_id = %node_id, is_light, "cache update queued");
        self.debounce.push(node_id, is_light, patch)
    }

    pub fn pending_len(&self) -> usize {
        self.debounce.len()
    }

    /// Apply every pending update now.
    ///
    /// Heavy when `force_heavy` or any pending update is heavy.
    pub async fn flush_now(&self, force_heavy: bool) -> Result<FlushOutcome> {
        let pending = self.debounce.take()?;
        let heavy = force_heavy || pending.values().any(|u| !u.is_light);

        let mut updates: Vec<(NodeId, PendingUpdate)> = pending.into_iter().collect();
        updates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records = self.records.lock().await;
        let now = now_ms();
        let mut applied = 0;

        for (node_id, update) in updates {
            let replacement = match update.patch {
                Patch::Optimistic(record) => Some(record),
                Patch::NeedsFetch(id) => match self.fetch(&id, now).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(node_id = %id, error = %e, "fetch failed, skipping update");
                        continue;
                    }
                },
            };
            match replacement {
                Some(record) => apply_patch(&mut records, record),
                None => records.retain(|r| r.node_id != node_id),
            }
            applied += 1;
        }

        if heavy {
            recompute_percentiles(&mut records);
        }
        self.persist(&records)?;

        tracing::debug!(applied, heavy, total = records.len(), "cache flushed");
        Ok(FlushOutcome { applied, heavy })
    }

    pub async fn flush_light(&self) -> Result<FlushOutcome> {
        self.flush_now(false).await
    }

    /// Snapshot of all cached records.
    pub async fn records(&self) -> Vec<PriorityRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn get(&self, node_id: &str) -> Option<PriorityRecord> {
        self.records.lock().await.iter().find(|r| r.node_id == node_id).cloned()
    }

    /// Knowledge-base percentile of a node as of the last heavy recompute.
    pub async fn percentile_of(&self, node_id: &str) -> Option<u8> {
        self.get(node_id).await.and_then(|r| r.kb_percentile)
    }

    /// Rank a node among the cached records that fall in `scope`.
    pub async fn scoped_percentile(&self, node_id: &str, scope: &ScopeSet) -> Option<u8> {
        let records = self.records.lock().await;
        let mut in_scope: Vec<&PriorityRecord> = records.iter().filter(|r| scope.contains(&r.node_id)).collect();
        in_scope.sort_by_key(|r| r.priority);
        let position = in_scope.iter().position(|r| r.node_id == node_id)?;
        Some(percentile_rank(position, in_scope.len()))
    }

    /// Cached records, or a ranked set computed straight from the graph when the
    /// cache is empty. The computed set is not stored.
    pub async fn records_or_compute(&self) -> Result<Vec<PriorityRecord>> {
        let cached = self.records().await;
        if !cached.is_empty() {
            return Ok(cached);
        }

        tracing::debug!("cache empty, computing records from graph");
        let now = now_ms();
        let mut computed = Vec::new();
        for id in self.candidates().await? {
            if let Some(record) = self.resolver.compute_record(&id, now).await? {
                computed.push(record);
            }
        }
        recompute_percentiles(&mut computed);
        Ok(computed)
    }

    /// Drop all records, pending updates and the stored snapshot.
    pub async fn clear(&self) -> Result<()> {
        self.debounce.take()?;
        let mut records = self.records.lock().await;
        records.clear();
        self.session.clear(CACHE_COLLECTION)
    }

    /// Nodes that belong in the cache: everything with review units or a priority tag.
    async fn candidates(&self) -> Result<Vec<NodeId>> {
        let graph = self.resolver.graph();
        let mut ids = graph.nodes_with_review_units().await?;
        for id in graph.nodes_with_tag(PRIORITY_TAG).await? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Current record for a node, or `None` when it should leave the cache.
    async fn fetch(&self, node_id: &str, now: i64) -> Result<Option<PriorityRecord>> {
        let Some(node) = self.resolver.graph().node(node_id).await? else {
            return Ok(None);
        };

        if node.has_tag(PRIORITY_TAG)
            && let Some(resolution) = read_record(&node)
        {
            return Ok(Some(record_for(&node, resolution, now)));
        }

        if node.has_tag(PRIORITY_TAG) || !node.review_units.is_empty() {
            let resolution = self.resolver.resolve_node(&node).await?;
            return Ok(Some(record_for(&node, resolution, now)));
        }

        Ok(None)
    }

    fn persist(&self, records: &[PriorityRecord]) -> Result<()> {
        let snapshot = CacheSnapshot {
            id: SNAPSHOT_ID.to_string(),
            updated_at: now_ms(),
            records: records.to_vec(),
        };
        self.session.upsert(CACHE_COLLECTION, &snapshot)
    }

    async fn replace_all(&self, mut fresh: Vec<PriorityRecord>) -> Result<usize> {
        recompute_percentiles(&mut fresh);
        let mut records = self.records.lock().await;
        *records = fresh;
        self.persist(&records)?;
        Ok(records.len())
    }

    async fn merge_batch(&self, batch: Vec<PriorityRecord>) -> Result<usize> {
        let mut records = self.records.lock().await;
        for record in batch {
            apply_patch(&mut records, record);
        }
        recompute_percentiles(&mut records);
        self.persist(&records)?;
        Ok(records.len())
    }
}

/// Patch a record in place, keeping the previous percentile marked stale.
fn apply_patch(records: &mut Vec<PriorityRecord>, mut record: PriorityRecord) {
    match records.iter_mut().find(|r| r.node_id == record.node_id) {
        Some(slot) => {
            record.kb_percentile = slot.kb_percentile;
            record.percentile_stale = true;
            *slot = record;
        }
        None => {
            record.kb_percentile = None;
            record.percentile_stale = true;
            records.push(record);
        }
    }
}

/// Read the stored snapshot. Missing or malformed data yields an empty cache.
fn load_snapshot<S: Storage>(session: &S) -> Vec<PriorityRecord> {
    match session.get::<CacheSnapshot>(CACHE_COLLECTION, SNAPSHOT_ID) {
        Ok(Some(snapshot)) => snapshot.records,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed cache snapshot");
            Vec::new()
        }
    }
}
