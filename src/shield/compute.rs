//! Priority shield computation.
//!
//! The shield is the most important item that is due and still unreviewed,
//! along with its volume percentile in the population it was drawn from. A low
//! percentile means the neglected item sits near the top of the pile.

use std::collections::HashSet;

use crate::domain::{IncrementalItem, ItemKind, NodeId, PriorityRecord, ScopeSet, ShieldRecord};

/// Anything the shield can be computed over.
pub trait ShieldItem {
    fn node_id(&self) -> &str;
    fn priority(&self) -> u8;
    fn is_due(&self, now: i64) -> bool;
}

impl ShieldItem for IncrementalItem {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn is_due(&self, now: i64) -> bool {
        IncrementalItem::is_due(self, now)
    }
}

/// Card-bearing records count as due when any review unit was due at resolution time.
impl ShieldItem for PriorityRecord {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn is_due(&self, _now: i64) -> bool {
        self.due_unit_count > 0
    }
}

/// Compute the shield over `universe`.
///
/// `current` is the item on screen; it stays eligible even though it is in `seen`.
pub fn compute_shield<T: ShieldItem>(universe: &[T], seen: &HashSet<NodeId>, current: Option<&str>, now: i64) -> ShieldRecord {
    let n = universe.len();

    let top_miss = universe
        .iter()
        .filter(|item| item.is_due(now))
        .filter(|item| !seen.contains(item.node_id()) || current == Some(item.node_id()))
        .map(|item| item.priority())
        .min();

    let Some(top) = top_miss else {
        return ShieldRecord::full(n);
    };

    let lower = universe.iter().filter(|item| item.priority() < top).count();
    let percentile = (((lower + 1) as f64 / n as f64) * 100.0).round().clamp(0.0, 100.0) as u8;

    ShieldRecord {
        absolute: Some(top),
        percentile: Some(percentile),
        universe_size: n,
    }
}

/// Knowledge-base and scope shields for one item type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldReport {
    pub kind: ItemKind,
    pub kb: ShieldRecord,
    /// Present when a scope was given
    pub scope: Option<ShieldRecord>,
}

impl ShieldReport {
    pub fn compute<T: ShieldItem + Clone>(
        kind: ItemKind,
        universe: &[T],
        scope: Option<&ScopeSet>,
        seen: &HashSet<NodeId>,
        current: Option<&str>,
        now: i64,
    ) -> Self {
        let kb = compute_shield(universe, seen, current, now);
        let scope = scope.map(|ids| {
            let scoped: Vec<T> = universe.iter().filter(|item| ids.contains(item.node_id())).cloned().collect();
            compute_shield(&scoped, seen, current, now)
        });
        Self { kind, kb, scope }
    }
}
