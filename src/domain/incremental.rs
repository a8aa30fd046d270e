//! Incremental items: nodes under active spaced-repetition scheduling.

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId};
use super::priority_record::clamp_priority;
use super::schema::{INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, SLOT_PRIORITY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalItem {
    pub node_id: NodeId,
    /// 0..=100, lower is more important
    pub priority: u8,
    /// Unix timestamp in milliseconds
    pub next_rep_date: i64,
}

impl IncrementalItem {
    pub fn new(node_id: impl Into<NodeId>, priority: i64, next_rep_date: i64) -> Self {
        Self {
            node_id: node_id.into(),
            priority: clamp_priority(priority),
            next_rep_date,
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        now >= self.next_rep_date
    }

    /// Read the incremental tag off a node.
    ///
    /// Returns `None` when the tag is missing or its slots do not parse.
    pub fn from_node(node: &Node) -> Option<Self> {
        if !node.has_tag(INCREMENTAL_TAG) {
            return None;
        }
        let priority = node.tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY)?.trim().parse::<i64>().ok()?;
        let next_rep_date = node
            .tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE)?
            .trim()
            .parse::<i64>()
            .ok()?;
        Some(Self::new(node.id.clone(), priority, next_rep_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_node() {
        let node = Node::new("i1")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, "20")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, "1000");
        let item = IncrementalItem::from_node(&node).unwrap();
        assert_eq!(item.priority, 20);
        assert_eq!(item.next_rep_date, 1000);
        assert!(item.is_due(1000));
        assert!(!item.is_due(999));
    }

    #[test]
    fn test_from_node_malformed() {
        let node = Node::new("i1")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, "high")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, "1000");
        assert!(IncrementalItem::from_node(&node).is_none());

        let untagged = Node::new("plain");
        assert!(IncrementalItem::from_node(&untagged).is_none());
    }

    #[test]
    fn test_priority_clamped() {
        let node = Node::new("i1")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, "400")
            .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, "0");
        assert_eq!(IncrementalItem::from_node(&node).unwrap().priority, 100);
    }
}
