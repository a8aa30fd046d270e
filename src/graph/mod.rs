//! Graph access facade.
//!
//! The knowledge graph lives outside this crate. Everything the engine needs from
//! it goes through [`GraphAccess`]: node lookup, tree traversal, tag writes,
//! reference lookup and the schema-slot tag set. Every call is a suspension point.

mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::schema::INCREMENTAL_TAG;
use crate::domain::{IncrementalItem, Node, NodeId, TagId};
use crate::error::Result;

pub use memory::{GraphSnapshot, MemoryGraph};

#[async_trait]
pub trait GraphAccess: Send + Sync {
    /// Look up a node. `Ok(None)` when it does not exist (or was deleted).
    async fn node(&self, id: &str) -> Result<Option<Node>>;

    /// Direct children in document order.
    async fn children(&self, id: &str) -> Result<Vec<NodeId>>;

    /// Nodes whose `references` point at `id`.
    async fn referencing(&self, id: &str) -> Result<Vec<NodeId>>;

    /// Write one tag slot, attaching the tag if needed.
    async fn set_tag_slot(&self, id: &str, tag: &str, slot: &str, value: &str) -> Result<()>;

    /// Detach a tag and all its slots. No-op when absent.
    async fn remove_tag(&self, id: &str, tag: &str) -> Result<()>;

    async fn nodes_with_tag(&self, tag: &str) -> Result<Vec<NodeId>>;

    async fn nodes_with_review_units(&self) -> Result<Vec<NodeId>>;

    /// Ids of the auto-generated slot tags. `None` when the graph cannot say.
    async fn schema_slot_tags(&self) -> Result<Option<HashSet<TagId>>>;

    /// All transitive descendants in pre-order, excluding `id` itself.
    ///
    /// Guards against cycles with a visited set.
    async fn descendants(&self, id: &str) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(id.to_string());

        let mut stack: Vec<NodeId> = self.children(id).await?.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let kids = self.children(&current).await?;
            out.push(current);
            stack.extend(kids.into_iter().rev());
        }

        Ok(out)
    }
}

/// All incremental items in the graph. Nodes with malformed incremental tags are skipped.
pub async fn load_incremental_items(graph: &dyn GraphAccess) -> Result<Vec<IncrementalItem>> {
    let mut items = Vec::new();
    for id in graph.nodes_with_tag(INCREMENTAL_TAG).await? {
        let Some(node) = graph.node(&id).await? else {
            continue;
        };
        match IncrementalItem::from_node(&node) {
            Some(item) => items.push(item),
            None => tracing::warn!(node_id = %id, "skipping malformed incremental tag"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{SLOT_NEXT_REP_DATE, SLOT_PRIORITY};

    #[tokio::test]
    async fn test_load_incremental_items_skips_malformed() {
        let graph = MemoryGraph::from_nodes([
            Node::new("good")
                .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, "10")
                .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, "0"),
            Node::new("bad").with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, "10"),
            Node::new("plain"),
        ]);

        let items = load_incremental_items(&graph).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].node_id, "good");
    }
}
