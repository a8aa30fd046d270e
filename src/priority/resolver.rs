//! Effective priority resolution.
//!
//! A node's priority comes from, in order:
//! - its own manual `cardPriority` record, or its own incremental priority
//! - the closest ancestor carrying an incremental priority or a non-default record
//! - the configured default

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::schema::{PRIORITY_TAG, SLOT_LAST_UPDATED, SLOT_PRIORITY, SLOT_SOURCE};
use crate::domain::{IncrementalItem, Node, PriorityRecord, PrioritySource, Resolution, clamp_priority};
use crate::error::{Result, ReviewqError};
use crate::graph::GraphAccess;
use crate::id::now_ms;

/// Default priority when nothing in the tree says otherwise.
pub const DEFAULT_PRIORITY: u8 = 50;

/// Read the `cardPriority` record stored on a node.
///
/// A missing or unparsable priority slot means no record. A missing source slot is
/// read as manual, since only a hand-edited tag lacks one.
pub fn read_record(node: &Node) -> Option<Resolution> {
    let raw = node.tag_slot(PRIORITY_TAG, SLOT_PRIORITY)?;
    let priority = raw.trim().parse::<i64>().ok()?;
    let source = match node.tag_slot(PRIORITY_TAG, SLOT_SOURCE) {
        Some(value) => PrioritySource::parse(value)?,
        None => PrioritySource::Manual,
    };
    Some(Resolution::new(priority, source))
}

/// Build the cache record for a node from a resolution.
pub fn record_for(node: &Node, resolution: Resolution, now: i64) -> PriorityRecord {
    let last_updated = node
        .tag_slot(PRIORITY_TAG, SLOT_LAST_UPDATED)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(now);
    PriorityRecord::new(node.id.clone(), resolution.priority as i64, resolution.source, last_updated)
        .with_counts(node.review_units.len(), node.due_unit_count(now))
}

pub struct PriorityResolver {
    graph: Arc<dyn GraphAccess>,
    default_priority: u8,
}

impl PriorityResolver {
    pub fn new(graph: Arc<dyn GraphAccess>) -> Self {
        Self {
            graph,
            default_priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_default_priority(mut self, priority: i64) -> Self {
        self.default_priority = clamp_priority(priority);
        self
    }

    pub fn default_priority(&self) -> u8 {
        self.default_priority
    }

    pub fn graph(&self) -> &Arc<dyn GraphAccess> {
        &self.graph
    }

    /// Resolve a node's effective priority. Unknown nodes resolve to the default.
    pub async fn resolve_priority(&self, node_id: &str) -> Result<Resolution> {
        match self.graph.node(node_id).await? {
            Some(node) => self.resolve_node(&node).await,
            None => Ok(self.default_resolution()),
        }
    }

    /// Resolve for an already-fetched node.
    pub async fn resolve_node(&self, node: &Node) -> Result<Resolution> {
        if let Some(own) = read_record(node)
            && own.source == PrioritySource::Manual
        {
            return Ok(own);
        }
        if let Some(item) = IncrementalItem::from_node(node) {
            return Ok(Resolution::new(item.priority as i64, PrioritySource::Manual));
        }

        if let Some(priority) = self.inherited_priority(node).await? {
            return Ok(Resolution::new(priority as i64, PrioritySource::Inherited));
        }

        Ok(self.default_resolution())
    }

    /// Same as [`resolve_priority`](Self::resolve_priority), but a manual `existing`
    /// record is echoed back untouched.
    pub async fn calculate_new_priority(&self, node_id: &str, existing: Option<&PriorityRecord>) -> Result<Resolution> {
        if let Some(record) = existing
            && record.is_manual()
        {
            return Ok(record.resolution());
        }
        self.resolve_priority(node_id).await
    }

    /// Write a priority onto a node, stamping `lastUpdated` with the current time.
    pub async fn set_priority(&self, node_id: &str, priority: i64, source: PrioritySource) -> Result<PriorityRecord> {
        let node = self
            .graph
            .node(node_id)
            .await?
            .ok_or_else(|| ReviewqError::NodeNotFound(node_id.to_string()))?;

        let now = now_ms();
        let priority = clamp_priority(priority);
        self.graph
            .set_tag_slot(node_id, PRIORITY_TAG, SLOT_PRIORITY, &priority.to_string())
            .await?;
        self.graph
            .set_tag_slot(node_id, PRIORITY_TAG, SLOT_SOURCE, source.as_str())
            .await?;
        self.graph
            .set_tag_slot(node_id, PRIORITY_TAG, SLOT_LAST_UPDATED, &now.to_string())
            .await?;

        tracing::debug!(node_id = %node_id, priority, source = %source, "priority written");

        Ok(
            PriorityRecord::new(node_id, priority as i64, source, now)
                .with_counts(node.review_units.len(), node.due_unit_count(now)),
        )
    }

    /// Detach the `cardPriority` tag from a node.
    pub async fn remove_priority(&self, node_id: &str) -> Result<()> {
        if self.graph.node(node_id).await?.is_none() {
            return Err(ReviewqError::NodeNotFound(node_id.to_string()));
        }
        self.graph.remove_tag(node_id, PRIORITY_TAG).await?;
        tracing::debug!(node_id = %node_id, "priority removed");
        Ok(())
    }

    /// Resolve and persist a card priority, writing only when something changed.
    ///
    /// Returns `None` for nodes that no longer exist.
    pub async fn auto_assign_card_priority(&self, node_id: &str) -> Result<Option<PriorityRecord>> {
        let Some(node) = self.graph.node(node_id).await? else {
            return Ok(None);
        };
        let now = now_ms();

        let existing = read_record(&node);
        if let Some(own) = existing
            && own.source == PrioritySource::Manual
        {
            return Ok(Some(record_for(&node, own, now)));
        }

        let resolved = self.resolve_node(&node).await?;
        if existing == Some(resolved) {
            return Ok(Some(record_for(&node, resolved, now)));
        }

        self.set_priority(node_id, resolved.priority as i64, resolved.source)
            .await
            .map(Some)
    }

    /// Resolve a node into a cache record without writing anything.
    pub async fn compute_record(&self, node_id: &str, now: i64) -> Result<Option<PriorityRecord>> {
        let Some(node) = self.graph.node(node_id).await? else {
            return Ok(None);
        };
        let resolution = self.resolve_node(&node).await?;
        Ok(Some(record_for(&node, resolution, now)))
    }

    fn default_resolution(&self) -> Resolution {
        Resolution::new(self.default_priority as i64, PrioritySource::Default)
    }

    /// Closest ancestor priority. Missing parents and cycles end the walk.
    async fn inherited_priority(&self, node: &Node) -> Result<Option<u8>> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node.id.clone());
        let mut current_parent = node.parent.clone();

        while let Some(parent_id) = current_parent {
            if !visited.insert(parent_id.clone()) {
                tracing::warn!(node_id = %node.id, at = %parent_id, "cycle in parent chain");
                return Ok(None);
            }
            let Some(parent) = self.graph.node(&parent_id).await? else {
                return Ok(None);
            };
            if let Some(item) = IncrementalItem::from_node(&parent) {
                return Ok(Some(item.priority));
            }
            if let Some(record) = read_record(&parent)
                && record.source != PrioritySource::Default
            {
                return Ok(Some(record.priority));
            }
            current_parent = parent.parent;
        }

        Ok(None)
    }
}
