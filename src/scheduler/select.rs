//! Next-item selection for a review session.
//!
//! Each step of a session asks the scheduler whether an incremental item should
//! be shown now, and which one. Items are:
//! - sorted by priority (or document position in in-order mode)
//! - filtered by scope, seen-this-session and due date
//! - interleaved with ordinary review units, `k` units per item
//! - partially shuffled by the configured randomness

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{IncrementalItem, NodeId, QueueSessionState};
use crate::error::{Result, ReviewqError};
use crate::graph::GraphAccess;
use crate::scheduler::cooldown::CooldownState;
use crate::scope::ScopeResolver;

/// Which items are eligible, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    /// Only items whose next repetition date has passed, by priority
    #[default]
    Due,
    /// Every unseen item, due or not, by priority
    PracticeAll,
    /// Every unseen item, in document order
    InOrder,
}

impl QueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMode::Due => "due",
            QueueMode::PracticeAll => "practice-all",
            QueueMode::InOrder => "in-order",
        }
    }

    pub fn checks_due(&self) -> bool {
        matches!(self, QueueMode::Due)
    }
}

impl FromStr for QueueMode {
    type Err = ReviewqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "due" => Ok(QueueMode::Due),
            "practice-all" | "all" => Ok(QueueMode::PracticeAll),
            "in-order" | "order" => Ok(QueueMode::InOrder),
            other => Err(ReviewqError::Config(format!("unknown queue mode: {other}"))),
        }
    }
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How incremental items are mixed into the ordinary queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interleave {
    /// `k` ordinary review units between two incremental items
    Every(u32),
    /// Incremental items only
    IncrementalOnly,
}

impl Default for Interleave {
    fn default() -> Self {
        Interleave::Every(3)
    }
}

impl Interleave {
    /// Whether step `counter` (0-based) is an incremental slot.
    pub fn is_item_slot(&self, counter: u64) -> bool {
        match self {
            Interleave::IncrementalOnly => true,
            Interleave::Every(k) => (counter + 1) % (*k as u64 + 1) == 0,
        }
    }
}

/// Per-step inputs
#[derive(Debug, Clone)]
pub struct SelectRequest {
    pub mode: QueueMode,
    /// 0.0 keeps sorted order, 1.0 shuffles thoroughly
    pub randomness: f64,
    /// Ordinary review units left in the queue, when known
    pub remaining_review_units: Option<usize>,
    /// Unix timestamp in milliseconds
    pub now: i64,
}

impl SelectRequest {
    pub fn new(mode: QueueMode, now: i64) -> Self {
        Self {
            mode,
            randomness: 0.0,
            remaining_review_units: None,
            now,
        }
    }

    pub fn with_randomness(mut self, randomness: f64) -> Self {
        self.randomness = randomness.clamp(0.0, 1.0);
        self
    }

    pub fn with_remaining_units(mut self, remaining: usize) -> Self {
        self.remaining_review_units = Some(remaining);
        self
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Show this incremental item
    Item(IncrementalItem),
    /// Let the ordinary queue continue
    Continue,
}

impl Selection {
    pub fn item(&self) -> Option<&IncrementalItem> {
        match self {
            Selection::Item(item) => Some(item),
            Selection::Continue => None,
        }
    }
}

/// Apply `round(randomness * n)` random pairwise swaps.
pub fn partial_shuffle<T, R: Rng + ?Sized>(items: &mut [T], randomness: f64, rng: &mut R) {
    let n = items.len();
    if n < 2 || randomness <= 0.0 {
        return;
    }
    let swaps = (randomness.clamp(0.0, 1.0) * n as f64).round() as usize;
    for _ in 0..swaps {
        let i = rng.random_range(0..n);
        let j = rng.random_range(0..n);
        items.swap(i, j);
    }
}

pub struct QueueScheduler {
    graph: Arc<dyn GraphAccess>,
    scopes: Arc<ScopeResolver>,
    cooldown: Arc<Mutex<CooldownState>>,
    interleave: Interleave,
    rng: Mutex<StdRng>,
}

impl QueueScheduler {
    pub fn new(graph: Arc<dyn GraphAccess>, scopes: Arc<ScopeResolver>) -> Self {
        Self {
            graph,
            scopes,
            cooldown: Arc::new(Mutex::new(CooldownState::new())),
            interleave: Interleave::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_interleave(mut self, interleave: Interleave) -> Self {
        self.interleave = interleave;
        self
    }

    /// Deterministic randomization
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Share a cooldown with other schedulers
    pub fn with_cooldown(mut self, cooldown: Arc<Mutex<CooldownState>>) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn interleave(&self) -> Interleave {
        self.interleave
    }

    pub fn cooldown(&self) -> Arc<Mutex<CooldownState>> {
        self.cooldown.clone()
    }

    pub fn start_cooldown(&self, duration: Duration) -> Result<()> {
        let mut cooldown = self.cooldown.lock().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        cooldown.start(duration);
        Ok(())
    }

    fn cooldown_active(&self) -> bool {
        self.cooldown.lock().map(|c| c.is_active()).unwrap_or(false)
    }

    /// Decide what the session shows next.
    ///
    /// Facade failures while validating candidates are logged and the candidate is
    /// skipped; a failing scope lookup yields `Continue`.
    pub async fn select_next(
        &self,
        session: &mut QueueSessionState,
        items: &[IncrementalItem],
        request: &SelectRequest,
    ) -> Result<Selection> {
        if self.cooldown_active() {
            tracing::debug!(session = %session.session_id, "cooldown active");
            session.interleaving_active = false;
            session.current_item = None;
            return Ok(Selection::Continue);
        }

        if let Err(e) = self.ensure_scope(session, request.mode).await {
            tracing::warn!(session = %session.session_id, error = %e, "scope unavailable");
            return Ok(self.skip(session));
        }

        let mut candidates = self.candidates(session, items, request);

        let item_slot = self.interleave.is_item_slot(session.item_counter) || request.remaining_review_units == Some(0);
        if !item_slot {
            return Ok(self.skip(session));
        }

        if candidates.is_empty() {
            tracing::debug!(session = %session.session_id, "no eligible incremental items");
            return Ok(self.skip(session));
        }

        {
            let mut rng = self.rng.lock().map_err(|e| ReviewqError::Storage(e.to_string()))?;
            partial_shuffle(&mut candidates, request.randomness, &mut *rng);
        }

        for candidate in candidates {
            match self.validate(&candidate.node_id).await {
                Ok(Some(item)) => {
                    session.mark_item_seen(item.node_id.clone());
                    session.advance();
                    tracing::debug!(
                        session = %session.session_id,
                        node_id = %item.node_id,
                        priority = item.priority,
                        counter = session.item_counter,
                        "incremental item selected"
                    );
                    return Ok(Selection::Item(item));
                }
                Ok(None) => {
                    tracing::debug!(node_id = %candidate.node_id, "candidate no longer valid");
                }
                Err(e) => {
                    tracing::warn!(node_id = %candidate.node_id, error = %e, "candidate lookup failed");
                }
            }
        }

        Ok(self.skip(session))
    }

    /// Eligible items, sorted for this mode.
    fn candidates(&self, session: &QueueSessionState, items: &[IncrementalItem], request: &SelectRequest) -> Vec<IncrementalItem> {
        let mut candidates: Vec<IncrementalItem> = items
            .iter()
            .filter(|item| session.in_scope(&item.node_id))
            .filter(|item| !session.seen_items.contains(&item.node_id))
            .filter(|item| !request.mode.checks_due() || item.is_due(request.now))
            .cloned()
            .collect();

        match (request.mode, &session.doc_order) {
            (QueueMode::InOrder, Some(order)) => {
                let position: HashMap<&NodeId, usize> = order.iter().enumerate().map(|(i, id)| (id, i)).collect();
                candidates.sort_by_key(|item| position.get(&item.node_id).copied().unwrap_or(usize::MAX));
            }
            (QueueMode::InOrder, None) => {}
            _ => candidates.sort_by_key(|item| item.priority),
        }

        candidates
    }

    /// Materialize scope and document order for the session root on first use.
    async fn ensure_scope(&self, session: &mut QueueSessionState, mode: QueueMode) -> Result<()> {
        let Some(root) = session.scope_root.clone() else {
            return Ok(());
        };
        let token = CancellationToken::new();

        if session.scope_ids.is_none() {
            let scope = self.scopes.build_scope(&root, &token).await?;
            session.scope_ids = Some(Arc::new(scope));
        }
        if mode == QueueMode::InOrder && session.doc_order.is_none() {
            let order = self.scopes.document_order(&root, &token).await?;
            session.doc_order = Some(Arc::new(order));
        }
        Ok(())
    }

    /// Re-read a candidate; `None` when it is gone or no longer incremental.
    async fn validate(&self, node_id: &str) -> Result<Option<IncrementalItem>> {
        let node = self.graph.node(node_id).await?;
        Ok(node.as_ref().and_then(IncrementalItem::from_node))
    }

    fn skip(&self, session: &mut QueueSessionState) -> Selection {
        session.advance();
        session.interleaving_active = false;
        Selection::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Node;
    use crate::domain::schema::{INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, SLOT_PRIORITY};
    use crate::graph::{MemoryGraph, load_incremental_items};

    const NOW: i64 = 1_000_000;

    fn item_node(id: &str, priority: u8, next_rep: i64) -> Node {
        Node::new(id)
            .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, priority.to_string())
            .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, next_rep.to_string())
    }

    fn setup(nodes: Vec<Node>, interleave: Interleave) -> (Arc<MemoryGraph>, QueueScheduler) {
        let graph = Arc::new(MemoryGraph::from_nodes(nodes));
        let scopes = Arc::new(ScopeResolver::new(graph.clone()));
        let scheduler = QueueScheduler::new(graph.clone(), scopes)
            .with_interleave(interleave)
            .with_seed(7);
        (graph, scheduler)
    }

    fn three_items() -> Vec<Node> {
        vec![
            item_node("p90", 90, 0),
            item_node("p10", 10, 0),
            item_node("p50", 50, 0),
        ]
    }

    async fn items_of(graph: &MemoryGraph) -> Vec<IncrementalItem> {
        load_incremental_items(graph).await.unwrap()
    }

    #[tokio::test]
    async fn test_two_continues_then_highest_priority() {
        let (graph, scheduler) = setup(three_items(), Interleave::Every(2));
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW);

        assert_eq!(scheduler.select_next(&mut session, &items, &request).await.unwrap(), Selection::Continue);
        assert_eq!(scheduler.select_next(&mut session, &items, &request).await.unwrap(), Selection::Continue);
        let third = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(third.item().unwrap().node_id, "p10");
        assert_eq!(session.item_counter, 3);
        assert!(session.interleaving_active);
    }

    #[tokio::test]
    async fn test_incremental_only_walks_priority_order() {
        let (graph, scheduler) = setup(three_items(), Interleave::IncrementalOnly);
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW);

        let mut order = Vec::new();
        for _ in 0..4 {
            if let Selection::Item(item) = scheduler.select_next(&mut session, &items, &request).await.unwrap() {
                order.push(item.node_id);
            }
        }
        assert_eq!(order, vec!["p10", "p50", "p90"]);
        assert_eq!(session.item_counter, 4);
    }

    #[tokio::test]
    async fn test_due_mode_skips_future_items() {
        let nodes = vec![item_node("later", 1, NOW + 10), item_node("now", 80, NOW)];
        let (graph, scheduler) = setup(nodes, Interleave::IncrementalOnly);
        let items = items_of(&graph).await;

        let mut session = QueueSessionState::new(None);
        let due = SelectRequest::new(QueueMode::Due, NOW);
        let picked = scheduler.select_next(&mut session, &items, &due).await.unwrap();
        assert_eq!(picked.item().unwrap().node_id, "now");

        let mut session = QueueSessionState::new(None);
        let all = SelectRequest::new(QueueMode::PracticeAll, NOW);
        let picked = scheduler.select_next(&mut session, &items, &all).await.unwrap();
        assert_eq!(picked.item().unwrap().node_id, "later");
    }

    #[tokio::test]
    async fn test_in_order_uses_document_position() {
        let nodes = vec![
            Node::new("doc"),
            item_node("first", 90, NOW + 1).with_parent("doc"),
            item_node("second", 10, NOW + 1).with_parent("doc"),
            item_node("outside", 0, 0),
        ];
        let (graph, scheduler) = setup(nodes, Interleave::IncrementalOnly);
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(Some("doc".to_string()));
        let request = SelectRequest::new(QueueMode::InOrder, NOW);

        let first = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(first.item().unwrap().node_id, "first");
        let second = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(second.item().unwrap().node_id, "second");
        // out-of-scope item never shows
        let third = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(third, Selection::Continue);
        assert!(session.doc_order.is_some());
    }

    #[tokio::test]
    async fn test_empty_queue_forces_item_slot() {
        let (graph, scheduler) = setup(three_items(), Interleave::Every(5));
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW).with_remaining_units(0);

        let picked = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(picked.item().unwrap().node_id, "p10");
    }

    #[tokio::test]
    async fn test_no_candidates_still_counts_step() {
        let (_, scheduler) = setup(vec![], Interleave::IncrementalOnly);
        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW);
        let picked = scheduler.select_next(&mut session, &[], &request).await.unwrap();
        assert_eq!(picked, Selection::Continue);
        assert_eq!(session.item_counter, 1);
    }

    #[tokio::test]
    async fn test_cooldown_returns_continue() {
        let (graph, scheduler) = setup(three_items(), Interleave::IncrementalOnly);
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(None);
        session.mark_item_seen("p90");
        scheduler.start_cooldown(Duration::from_secs(60)).unwrap();

        let request = SelectRequest::new(QueueMode::Due, NOW);
        let picked = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(picked, Selection::Continue);
        assert_eq!(session.item_counter, 0);
        assert!(!session.interleaving_active);
        assert!(session.current_item.is_none());
    }

    #[tokio::test]
    async fn test_deleted_candidate_is_skipped() {
        let (graph, scheduler) = setup(three_items(), Interleave::IncrementalOnly);
        let items = items_of(&graph).await;
        graph.remove("p10");

        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW);
        let picked = scheduler.select_next(&mut session, &items, &request).await.unwrap();
        assert_eq!(picked.item().unwrap().node_id, "p50");
    }

    #[tokio::test]
    async fn test_full_randomness_still_visits_each_item_once() {
        let (graph, scheduler) = setup(three_items(), Interleave::IncrementalOnly);
        let items = items_of(&graph).await;
        let mut session = QueueSessionState::new(None);
        let request = SelectRequest::new(QueueMode::Due, NOW).with_randomness(1.0);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let picked = scheduler.select_next(&mut session, &items, &request).await.unwrap();
            seen.push(picked.item().unwrap().node_id.clone());
        }
        seen.sort();
        assert_eq!(seen, vec!["p10", "p50", "p90"]);
    }

    #[test]
    fn test_partial_shuffle_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut values = vec![1, 2, 3, 4];
        partial_shuffle(&mut values, 0.0, &mut rng);
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_interleave_slots() {
        let every2 = Interleave::Every(2);
        let slots: Vec<bool> = (0..6).map(|c| every2.is_item_slot(c)).collect();
        assert_eq!(slots, vec![false, false, true, false, false, true]);
        assert!(Interleave::Every(0).is_item_slot(0));
        assert!(Interleave::IncrementalOnly.is_item_slot(17));
    }

    #[test]
    fn test_queue_mode_parse() {
        assert_eq!("due".parse::<QueueMode>().unwrap(), QueueMode::Due);
        assert_eq!("practice_all".parse::<QueueMode>().unwrap(), QueueMode::PracticeAll);
        assert_eq!("In-Order".parse::<QueueMode>().unwrap(), QueueMode::InOrder);
        assert!("random".parse::<QueueMode>().is_err());
    }
}
