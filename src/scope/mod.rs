//! Scope materialization.
//!
//! A scope is every node that belongs to a document or queue context: the root,
//! its subtree, the sources it cites, the content of cited documents and the
//! extracts taken from them, and nodes that reference the root.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::domain::schema::{EXTRACT_TAGS, looks_like_slot_name};
use crate::domain::{Node, NodeId, ScopeSet, TagId};
use crate::error::{Result, ReviewqError};
use crate::graph::GraphAccess;

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ReviewqError::Cancelled("scope traversal".to_string()));
    }
    Ok(())
}

fn is_extract(node: &Node) -> bool {
    EXTRACT_TAGS.iter().any(|tag| node.has_tag(tag))
}

pub struct ScopeResolver {
    graph: Arc<dyn GraphAccess>,
    /// Schema slot tag ids, fetched once
    slot_tags: OnceCell<Option<HashSet<TagId>>>,
}

impl ScopeResolver {
    pub fn new(graph: Arc<dyn GraphAccess>) -> Self {
        Self {
            graph,
            slot_tags: OnceCell::new(),
        }
    }

    /// Materialize the scope rooted at `root_id`. Unknown roots give an empty set.
    pub async fn build_scope(&self, root_id: &str, cancel: &CancellationToken) -> Result<ScopeSet> {
        let mut scope = ScopeSet::new();

        let root = self.graph.node(root_id).await?;
        check(cancel)?;
        let Some(root) = root else {
            tracing::debug!(root = %root_id, "scope root not found");
            return Ok(scope);
        };

        let descendants = self.graph.descendants(root_id).await?;
        check(cancel)?;

        scope.insert(root.id.clone());
        scope.extend(descendants.iter().cloned());

        let mut sources: Vec<NodeId> = root.sources.clone();
        for id in &descendants {
            let node = self.graph.node(id).await?;
            check(cancel)?;
            if let Some(node) = node {
                sources.extend(node.sources);
            }
        }

        let mut seen_sources = HashSet::new();
        for source_id in sources {
            if !seen_sources.insert(source_id.clone()) {
                continue;
            }
            scope.insert(source_id.clone());
            self.add_document_content(&source_id, &mut scope, cancel).await?;
        }

        let slot_tags = self.slot_tags().await?;
        check(cancel)?;
        for ref_id in self.graph.referencing(root_id).await? {
            let node = self.graph.node(&ref_id).await?;
            check(cancel)?;
            if let Some(node) = node
                && !is_metadata(&node, slot_tags)
            {
                scope.insert(ref_id);
            }
        }

        tracing::debug!(root = %root_id, size = scope.len(), "scope built");
        Ok(scope)
    }

    /// Pre-order ids of the root and its subtree.
    pub async fn document_order(&self, root_id: &str, cancel: &CancellationToken) -> Result<Vec<NodeId>> {
        let root = self.graph.node(root_id).await?;
        check(cancel)?;
        if root.is_none() {
            return Ok(Vec::new());
        }
        let descendants = self.graph.descendants(root_id).await?;
        check(cancel)?;

        let mut order = Vec::with_capacity(descendants.len() + 1);
        order.push(root_id.to_string());
        order.extend(descendants);
        Ok(order)
    }

    async fn slot_tags(&self) -> Result<&Option<HashSet<TagId>>> {
        self.slot_tags
            .get_or_try_init(|| async { self.graph.schema_slot_tags().await })
            .await
    }

    /// For a document source, pull in its own subtree plus the extracts that
    /// reference it and their subtrees.
    async fn add_document_content(&self, source_id: &str, scope: &mut ScopeSet, cancel: &CancellationToken) -> Result<()> {
        let source = self.graph.node(source_id).await?;
        check(cancel)?;
        let Some(source) = source else {
            return Ok(());
        };
        if !source.is_document() {
            return Ok(());
        }

        let content = self.graph.descendants(source_id).await?;
        check(cancel)?;
        scope.extend(content);

        for ref_id in self.graph.referencing(source_id).await? {
            let node = self.graph.node(&ref_id).await?;
            check(cancel)?;
            let Some(node) = node else {
                continue;
            };
            if !is_extract(&node) {
                continue;
            }
            let subtree = self.graph.descendants(&ref_id).await?;
            check(cancel)?;
            scope.insert(ref_id);
            scope.extend(subtree);
        }
        Ok(())
    }
}

/// Whether a node is auto-generated tag slot metadata rather than content.
pub fn is_metadata(node: &Node, slot_tags: &Option<HashSet<TagId>>) -> bool {
    match slot_tags {
        Some(tags) => node.tags.keys().any(|t| tags.contains(t)),
        None => looks_like_slot_name(&node.name),
    }
}
