//! Knowledge-graph node as seen through the graph facade.
//!
//! Nodes are owned by the graph store. The engine only reads them and annotates
//! them through tag slots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque node identifier
pub type NodeId = String;

/// Tag identifier (a schema node in the graph)
pub type TagId = String;

/// Kind of content-bearing external document a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Html,
    Video,
}

/// A schedulable flashcard belonging to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewUnit {
    pub id: String,
    /// Unix timestamp in milliseconds
    pub next_due: i64,
}

impl ReviewUnit {
    pub fn new(id: impl Into<String>, next_due: i64) -> Self {
        Self {
            id: id.into(),
            next_due,
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_due <= now
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    #[serde(default)]
    pub parent: Option<NodeId>,

    #[serde(default)]
    pub name: String,

    /// tag id -> slot name -> slot value
    #[serde(default)]
    pub tags: BTreeMap<TagId, BTreeMap<String, String>>,

    /// Source cross-references (where this node's content came from)
    #[serde(default)]
    pub sources: Vec<NodeId>,

    /// Outgoing references to other nodes
    #[serde(default)]
    pub references: Vec<NodeId>,

    /// Set when the node is an external document (pdf, web page, video)
    #[serde(default)]
    pub document: Option<DocumentKind>,

    #[serde(default)]
    pub review_units: Vec<ReviewUnit>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a bare tag (no slot values)
    pub fn with_tag(mut self, tag: impl Into<TagId>) -> Self {
        self.tags.entry(tag.into()).or_default();
        self
    }

    pub fn with_tag_slot(mut self, tag: impl Into<TagId>, slot: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.entry(tag.into()).or_default().insert(slot.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<NodeId>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn with_reference(mut self, target: impl Into<NodeId>) -> Self {
        self.references.push(target.into());
        self
    }

    pub fn with_document(mut self, kind: DocumentKind) -> Self {
        self.document = Some(kind);
        self
    }

    pub fn with_review_unit(mut self, unit: ReviewUnit) -> Self {
        self.review_units.push(unit);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn tag_slot(&self, tag: &str, slot: &str) -> Option<&str> {
        self.tags.get(tag).and_then(|slots| slots.get(slot)).map(String::as_str)
    }

    pub fn is_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn due_unit_count(&self, now: i64) -> usize {
        self.review_units.iter().filter(|u| u.is_due(now)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_tag_lookup() {
        let node = Node::new("n1")
            .with_parent("root")
            .with_tag_slot("cardPriority", "priority", "30")
            .with_tag("highlight");

        assert_eq!(node.parent.as_deref(), Some("root"));
        assert!(node.has_tag("highlight"));
        assert_eq!(node.tag_slot("cardPriority", "priority"), Some("30"));
        assert_eq!(node.tag_slot("cardPriority", "source"), None);
        assert_eq!(node.tag_slot("missing", "priority"), None);
    }

    #[test]
    fn test_due_unit_count() {
        let node = Node::new("n1")
            .with_review_unit(ReviewUnit::new("c1", 100))
            .with_review_unit(ReviewUnit::new("c2", 200))
            .with_review_unit(ReviewUnit::new("c3", 300));

        assert_eq!(node.due_unit_count(50), 0);
        assert_eq!(node.due_unit_count(200), 2);
        assert_eq!(node.due_unit_count(1000), 3);
    }

    #[test]
    fn test_deserialize_minimal_node() {
        let node: Node = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(node.id, "x");
        assert!(node.parent.is_none());
        assert!(node.tags.is_empty());
        assert!(!node.is_document());
    }

    #[test]
    fn test_document_kind_serde() {
        let node: Node = serde_json::from_str(r#"{"id": "d", "document": "pdf"}"#).unwrap();
        assert_eq!(node.document, Some(DocumentKind::Pdf));
    }
}
