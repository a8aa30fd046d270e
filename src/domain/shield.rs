//! Priority shield snapshot types.

use serde::{Deserialize, Serialize};

/// Which population a shield value was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Incremental items
    Incremental,
    /// Card-bearing nodes from the priority cache
    Card,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Incremental => "incremental",
            ItemKind::Card => "card",
        }
    }

    pub fn all() -> &'static [ItemKind] {
        &[ItemKind::Incremental, ItemKind::Card]
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worst currently-neglected item and how much of the population it leaves covered.
///
/// `percentile == Some(100)` with `absolute == None` means nothing was missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldRecord {
    /// Priority of the top miss
    pub absolute: Option<u8>,
    /// Volume percentile of the top miss in the full universe
    pub percentile: Option<u8>,
    pub universe_size: usize,
}

impl ShieldRecord {
    /// Full protection: nothing due and unseen
    pub fn full(universe_size: usize) -> Self {
        Self {
            absolute: None,
            percentile: Some(100),
            universe_size,
        }
    }

    pub fn is_full(&self) -> bool {
        self.absolute.is_none() && self.percentile == Some(100)
    }
}
