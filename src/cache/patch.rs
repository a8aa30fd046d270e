//! Pending cache updates.

use crate::domain::{NodeId, PriorityRecord};

/// What to apply for one node at the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// The caller already knows the new record
    Optimistic(PriorityRecord),
    /// Re-read the node from the graph at flush time
    NeedsFetch(NodeId),
}

impl Patch {
    pub fn node_id(&self) -> &str {
        match self {
            Patch::Optimistic(record) => &record.node_id,
            Patch::NeedsFetch(id) => id,
        }
    }
}

/// A patch waiting in the debounce window.
///
/// `is_light` updates keep the previous percentiles; one heavy update in the
/// window forces a full re-rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub is_light: bool,
    pub patch: Patch,
}

impl PendingUpdate {
    pub fn new(is_light: bool, patch: Patch) -> Self {
        Self { is_light, patch }
    }

    /// Collapse a newer update for the same node into this one.
    /// The newer patch wins; heaviness is sticky.
    pub fn merge(self, newer: PendingUpdate) -> PendingUpdate {
        PendingUpdate {
            is_light: self.is_light && newer.is_light,
            patch: newer.patch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PrioritySource;

    #[test]
    fn test_merge_latest_patch_wins() {
        let first = PendingUpdate::new(true, Patch::NeedsFetch("a".to_string()));
        let record = PriorityRecord::new("a", 5, PrioritySource::Manual, 0);
        let merged = first.merge(PendingUpdate::new(true, Patch::Optimistic(record.clone())));
        assert!(merged.is_light);
        assert_eq!(merged.patch, Patch::Optimistic(record));
    }

    #[test]
    fn test_merge_heavy_is_sticky() {
        let heavy = PendingUpdate::new(false, Patch::NeedsFetch("a".to_string()));
        let merged = heavy.merge(PendingUpdate::new(true, Patch::NeedsFetch("a".to_string())));
        assert!(!merged.is_light);
    }

    #[test]
    fn test_patch_node_id() {
        assert_eq!(Patch::NeedsFetch("x".to_string()).node_id(), "x");
        let record = PriorityRecord::new("y", 5, PrioritySource::Manual, 0);
        assert_eq!(Patch::Optimistic(record).node_id(), "y");
    }
}
