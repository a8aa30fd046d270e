//! Ephemeral per-session queue state.

use std::collections::HashSet;
use std::sync::Arc;

use super::node::NodeId;
use crate::id::generate_session_id;

/// Node ids belonging to one scheduling scope
pub type ScopeSet = HashSet<NodeId>;

/// State for one review session: what was seen, where we are in the interleave.
#[derive(Debug, Clone)]
pub struct QueueSessionState {
    pub session_id: String,

    /// Root node the session is scoped to (None = whole knowledge base)
    pub scope_root: Option<NodeId>,

    /// Materialized scope for `scope_root`
    pub scope_ids: Option<Arc<ScopeSet>>,

    /// Document order of the scope, for in-order mode
    pub doc_order: Option<Arc<Vec<NodeId>>>,

    pub seen_cards: HashSet<NodeId>,

    pub seen_items: HashSet<NodeId>,

    /// Steps taken this session, incremental or not
    pub item_counter: u64,

    /// Incremental item currently on screen
    pub current_item: Option<NodeId>,

    /// An incremental item is being shown in place of the card queue
    pub interleaving_active: bool,
}

impl QueueSessionState {
    pub fn new(scope_root: Option<NodeId>) -> Self {
        Self {
            session_id: generate_session_id(),
            scope_root,
            scope_ids: None,
            doc_order: None,
            seen_cards: HashSet::new(),
            seen_items: HashSet::new(),
            item_counter: 0,
            current_item: None,
            interleaving_active: false,
        }
    }

    pub fn with_scope(mut self, scope: ScopeSet) -> Self {
        self.scope_ids = Some(Arc::new(scope));
        self
    }

    /// Record an ordinary review unit being shown.
    pub fn mark_card_seen(&mut self, node_id: impl Into<NodeId>) {
        self.seen_cards.insert(node_id.into());
        self.interleaving_active = false;
        self.current_item = None;
    }

    pub fn mark_item_seen(&mut self, node_id: impl Into<NodeId>) {
        let node_id = node_id.into();
        self.seen_items.insert(node_id.clone());
        self.current_item = Some(node_id);
        self.interleaving_active = true;
    }

    pub fn advance(&mut self) {
        self.item_counter += 1;
    }

    pub fn in_scope(&self, node_id: &str) -> bool {
        match &self.scope_ids {
            Some(scope) => scope.contains(node_id),
            None => true,
        }
    }

    /// Drop everything; used at session exit.
    pub fn clear(&mut self) {
        self.scope_root = None;
        self.scope_ids = None;
        self.doc_order = None;
        self.seen_cards.clear();
        self.seen_items.clear();
        self.item_counter = 0;
        self.current_item = None;
        self.interleaving_active = false;
    }
}
