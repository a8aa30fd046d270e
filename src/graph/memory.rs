//! In-memory graph backed by a JSON snapshot.
//!
//! Used by the CLI (load a snapshot exported from the graph store, write tag
//! changes back) and by tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GraphAccess;
use crate::domain::{Node, NodeId, TagId};
use crate::error::{Result, ReviewqError};

/// On-disk shape of a graph export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,

    /// Schema slot tag ids, if the exporter knew them
    #[serde(default)]
    pub slot_tags: Option<Vec<TagId>>,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    /// Insertion order; children are reported in this order
    order: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
    slot_tags: Option<HashSet<TagId>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }
        graph
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::from_nodes(snapshot.nodes);
        graph.slot_tags = snapshot.slot_tags.map(|tags| tags.into_iter().collect());
        graph
    }

    pub fn with_slot_tags(mut self, tags: impl IntoIterator<Item = impl Into<TagId>>) -> Self {
        self.slot_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Load a snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let snapshot: GraphSnapshot = serde_json::from_str(&content)?;
        log::info!("Loaded {} nodes from {}", snapshot.nodes.len(), path.display());
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current graph back as a snapshot file
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        let state = self.state.read().map_err(|e| ReviewqError::Graph(e.to_string()))?;
        let nodes = state.order.iter().filter_map(|id| state.nodes.get(id).cloned()).collect();
        let mut slot_tags: Option<Vec<TagId>> = self.slot_tags.as_ref().map(|t| t.iter().cloned().collect());
        if let Some(tags) = slot_tags.as_mut() {
            tags.sort();
        }
        Ok(GraphSnapshot { nodes, slot_tags })
    }

    /// Insert or replace a node. Poisoned locks are recovered since the state is plain data.
    pub fn insert(&self, node: Node) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.nodes.contains_key(&node.id) {
            state.order.push(node.id.clone());
        }
        state.nodes.insert(node.id.clone(), node);
    }

    /// Delete a node. Children keep their dangling parent pointer.
    pub fn remove(&self, id: &str) -> Option<Node> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.order.retain(|n| n != id);
        state.nodes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T>(&self, f: impl FnOnce(&GraphState) -> T) -> Result<T> {
        let state = self.state.read().map_err(|e| ReviewqError::Graph(e.to_string()))?;
        Ok(f(&state))
    }

    fn ordered_ids(state: &GraphState, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        state
            .order
            .iter()
            .filter(|id| state.nodes.get(id.as_str()).map(&pred).unwrap_or(false))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GraphAccess for MemoryGraph {
    async fn node(&self, id: &str) -> Result<Option<Node>> {
        self.read(|s| s.nodes.get(id).cloned())
    }

    async fn children(&self, id: &str) -> Result<Vec<NodeId>> {
        self.read(|s| Self::ordered_ids(s, |n| n.parent.as_deref() == Some(id)))
    }

    async fn referencing(&self, id: &str) -> Result<Vec<NodeId>> {
        self.read(|s| Self::ordered_ids(s, |n| n.references.iter().any(|r| r == id)))
    }

    async fn set_tag_slot(&self, id: &str, tag: &str, slot: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|e| ReviewqError::Graph(e.to_string()))?;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| ReviewqError::NodeNotFound(id.to_string()))?;
        node.tags
            .entry(tag.to_string())
            .or_default()
            .insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_tag(&self, id: &str, tag: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|e| ReviewqError::Graph(e.to_string()))?;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| ReviewqError::NodeNotFound(id.to_string()))?;
        node.tags.remove(tag);
        Ok(())
    }

    async fn nodes_with_tag(&self, tag: &str) -> Result<Vec<NodeId>> {
        self.read(|s| Self::ordered_ids(s, |n| n.has_tag(tag)))
    }

    async fn nodes_with_review_units(&self) -> Result<Vec<NodeId>> {
        self.read(|s| Self::ordered_ids(s, |n| !n.review_units.is_empty()))
    }

    async fn schema_slot_tags(&self) -> Result<Option<HashSet<TagId>>> {
        Ok(self.slot_tags.clone())
    }
}
