//! Priority record types.
//!
//! A `PriorityRecord` is the cached, rank-annotated view of one node's effective
//! priority. Lower priority numbers are more important.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Most important priority value
pub const MIN_PRIORITY: u8 = 0;
/// Least important priority value
pub const MAX_PRIORITY: u8 = 100;

/// Clamp any integer into the valid priority range.
pub fn clamp_priority(value: i64) -> u8 {
    value.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

/// Where an effective priority came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrioritySource {
    /// Set explicitly by the user; never overwritten by inheritance
    Manual,
    /// Copied from the closest prioritized ancestor
    Inherited,
    /// Nothing found; configured default
    Default,
}

impl PrioritySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrioritySource::Manual => "manual",
            PrioritySource::Inherited => "inherited",
            PrioritySource::Default => "default",
        }
    }

    /// Parse a stored slot value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(PrioritySource::Manual),
            "inherited" => Some(PrioritySource::Inherited),
            "default" => Some(PrioritySource::Default),
            _ => None,
        }
    }
}

impl std::fmt::Display for PrioritySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of resolving a node's effective priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub priority: u8,
    pub source: PrioritySource,
}

impl Resolution {
    pub fn new(priority: i64, source: PrioritySource) -> Self {
        Self {
            priority: clamp_priority(priority),
            source,
        }
    }
}

/// Cached priority of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRecord {
    pub node_id: NodeId,

    /// 0..=100, lower is more important
    pub priority: u8,

    pub source: PrioritySource,

    /// Unix timestamp in milliseconds
    pub last_updated: i64,

    pub review_unit_count: usize,

    pub due_unit_count: usize,

    /// Rank among all cached records; only trustworthy right after a heavy recompute
    #[serde(default)]
    pub kb_percentile: Option<u8>,

    /// Set by light patches that kept the previous percentile
    #[serde(default)]
    pub percentile_stale: bool,
}

impl PriorityRecord {
    pub fn new(node_id: impl Into<NodeId>, priority: i64, source: PrioritySource, last_updated: i64) -> Self {
        Self {
            node_id: node_id.into(),
            priority: clamp_priority(priority),
            source,
            last_updated,
            review_unit_count: 0,
            due_unit_count: 0,
            kb_percentile: None,
            percentile_stale: false,
        }
    }

    pub fn with_counts(mut self, review_unit_count: usize, due_unit_count: usize) -> Self {
        self.review_unit_count = review_unit_count;
        self.due_unit_count = due_unit_count;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            priority: self.priority,
            source: self.source,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.source == PrioritySource::Manual
    }

    /// Percentile that can be relied on (fresh after a heavy pass)
    pub fn fresh_percentile(&self) -> Option<u8> {
        if self.percentile_stale { None } else { self.kb_percentile }
    }
}
