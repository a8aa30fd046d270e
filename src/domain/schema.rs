//! Tag schema the engine reads and writes on graph nodes.

/// Tag holding a node's card priority
pub const PRIORITY_TAG: &str = "cardPriority";
/// Tag marking a node as an incremental item
pub const INCREMENTAL_TAG: &str = "incremental";

pub const SLOT_PRIORITY: &str = "priority";
pub const SLOT_SOURCE: &str = "source";
pub const SLOT_LAST_UPDATED: &str = "lastUpdated";
pub const SLOT_NEXT_REP_DATE: &str = "nextRepDate";
pub const SLOT_HISTORY: &str = "history";

/// Tags whose presence marks a node as an extract/highlight of a document
pub const EXTRACT_TAGS: &[&str] = &["extract", "highlight"];

/// Names the graph gives auto-generated slot children of the schema tags.
pub const SLOT_NAMES: &[&str] = &[
    SLOT_PRIORITY,
    SLOT_SOURCE,
    SLOT_LAST_UPDATED,
    SLOT_NEXT_REP_DATE,
    SLOT_HISTORY,
];

/// Name-based fallback for spotting slot metadata nodes.
pub fn looks_like_slot_name(name: &str) -> bool {
    let trimmed = name.trim().trim_end_matches(':').trim();
    SLOT_NAMES.iter().any(|slot| slot.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_slot_name() {
        assert!(looks_like_slot_name("priority"));
        assert!(looks_like_slot_name(" Priority: "));
        assert!(looks_like_slot_name("nextRepDate"));
        assert!(!looks_like_slot_name("Chapter 1"));
        assert!(!looks_like_slot_name(""));
    }
}
