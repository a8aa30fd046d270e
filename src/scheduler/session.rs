//! Review session lifecycle.
//!
//! The SessionManager owns the state of at most one session:
//! 1. `enter` starts a session and materializes its scope on a background task
//! 2. `next` drives the queue scheduler once the scope is ready
//! 3. `exit` cancels an unfinished entry, snapshots the shield history and clears state

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::PriorityCache;
use crate::domain::{IncrementalItem, ItemKind, NodeId, PriorityRecord, QueueSessionState, ScopeSet};
use crate::error::{Result, ReviewqError};
use crate::graph::{GraphAccess, load_incremental_items};
use crate::scheduler::select::{QueueScheduler, SelectRequest, Selection};
use crate::scope::ScopeResolver;
use crate::shield::{KB_SCOPE, ShieldEntry, ShieldHistory, ShieldReport};
use crate::storage::Storage;

/// Scope materialization still running for a fresh session.
struct PendingEntry {
    token: CancellationToken,
    handle: JoinHandle<Result<ScopeSet>>,
}

pub struct SessionManager<C: Storage, D: Storage> {
    graph: Arc<dyn GraphAccess>,
    scopes: Arc<ScopeResolver>,
    scheduler: QueueScheduler,
    cache: Arc<PriorityCache<C>>,
    history: ShieldHistory<D>,
    state: Option<QueueSessionState>,
    entry: Option<PendingEntry>,
}

impl<C: Storage + 'static, D: Storage> SessionManager<C, D> {
    pub fn new(
        graph: Arc<dyn GraphAccess>,
        scopes: Arc<ScopeResolver>,
        scheduler: QueueScheduler,
        cache: Arc<PriorityCache<C>>,
        history: ShieldHistory<D>,
    ) -> Self {
        Self {
            graph,
            scopes,
            scheduler,
            cache,
            history,
            state: None,
            entry: None,
        }
    }

    pub fn scheduler(&self) -> &QueueScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &ShieldHistory<D> {
        &self.history
    }

    pub fn session(&self) -> Option<&QueueSessionState> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Whether scope materialization is still in flight
    pub fn is_entering(&self) -> bool {
        self.entry.as_ref().map(|e| !e.handle.is_finished()).unwrap_or(false)
    }

    /// Start a session, replacing any active one without snapshotting it.
    pub fn enter(&mut self, scope_root: Option<NodeId>) {
        self.cancel_entry();

        let state = QueueSessionState::new(scope_root.clone());
        tracing::info!(session = %state.session_id, root = ?scope_root, "session entered");

        if let Some(root) = scope_root {
            let token = CancellationToken::new();
            let scopes = self.scopes.clone();
            let task_token = token.clone();
            let handle = tokio::spawn(async move { scopes.build_scope(&root, &task_token).await });
            self.entry = Some(PendingEntry { token, handle });
        }

        self.state = Some(state);
    }

    /// Wait for scope materialization to finish and attach the scope.
    ///
    /// A failed entry leaves the scope unset; the scheduler rebuilds it on demand
    /// and keeps answering `Continue` while the graph refuses.
    pub async fn ready(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let scope = match entry.handle.await {
            Ok(Ok(scope)) => scope,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "session scope failed, deferring to scheduler");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "session scope task failed, deferring to scheduler");
                return;
            }
        };

        if let Some(state) = self.state.as_mut() {
            tracing::debug!(session = %state.session_id, size = scope.len(), "session scope ready");
            state.scope_ids = Some(Arc::new(scope));
        }
    }

    /// Ask the scheduler for the next step of the active session.
    pub async fn next(&mut self, items: &[IncrementalItem], request: &SelectRequest) -> Result<Selection> {
        self.ready().await;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ReviewqError::InvalidState("no active session".to_string()))?;
        self.scheduler.select_next(state, items, request).await
    }

    /// Record an ordinary review unit shown by the host queue.
    pub fn mark_card_seen(&mut self, node_id: &str) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ReviewqError::InvalidState("no active session".to_string()))?;
        state.mark_card_seen(node_id);
        Ok(())
    }

    /// Shield reports for both item types, over the knowledge base and the session scope.
    pub async fn shield_reports(&self, now: i64) -> Result<Vec<ShieldReport>> {
        let empty = QueueSessionState::new(None);
        let state = self.state.as_ref().unwrap_or(&empty);
        let scope = state.scope_ids.as_deref();

        let items = load_incremental_items(self.graph.as_ref()).await?;
        let cards = self.current_cards(now).await?;

        Ok(vec![
            ShieldReport::compute(
                ItemKind::Incremental,
                &items,
                scope,
                &state.seen_items,
                state.current_item.as_deref(),
                now,
            ),
            ShieldReport::compute(ItemKind::Card, &cards, scope, &state.seen_cards, None, now),
        ])
    }

    /// Cached card records with their due counts re-read from the graph at `now`.
    ///
    /// Nodes gone from the graph are dropped; a failed lookup keeps the cached count.
    async fn current_cards(&self, now: i64) -> Result<Vec<PriorityRecord>> {
        let mut cards = Vec::new();
        for mut record in self.cache.records_or_compute().await? {
            match self.graph.node(&record.node_id).await {
                Ok(Some(node)) => {
                    record.review_unit_count = node.review_units.len();
                    record.due_unit_count = node.due_unit_count(now);
                    cards.push(record);
                }
                Ok(None) => tracing::debug!(node_id = %record.node_id, "cached card left the graph"),
                Err(e) => {
                    tracing::warn!(node_id = %record.node_id, error = %e, "due recount failed, using cached count");
                    cards.push(record);
                }
            }
        }
        Ok(cards)
    }

    /// Write today's shield values for the session to history.
    pub async fn snapshot_shields(&self, now: i64) -> Result<Vec<ShieldEntry>> {
        let scope_key = self.state.as_ref().and_then(|s| s.scope_root.clone());
        let mut entries = Vec::new();
        for report in self.shield_reports(now).await? {
            entries.push(self.history.snapshot(KB_SCOPE, report.kind, report.kb, now)?);
            if let (Some(key), Some(scoped)) = (scope_key.as_deref(), report.scope) {
                entries.push(self.history.snapshot(key, report.kind, scoped, now)?);
            }
        }
        Ok(entries)
    }

    /// End the session.
    ///
    /// An unfinished entry is cancelled first; the scope-wide snapshot is then
    /// skipped since the scope never materialized.
    pub async fn exit(&mut self, now: i64) -> Result<Vec<ShieldEntry>> {
        if let Some(entry) = self.entry.take() {
            entry.token.cancel();
            match entry.handle.await {
                Ok(Ok(scope)) => {
                    if let Some(state) = self.state.as_mut() {
                        state.scope_ids = Some(Arc::new(scope));
                    }
                }
                Ok(Err(e)) if e.is_cancelled() => tracing::debug!("session entry cancelled"),
                Ok(Err(e)) => tracing::warn!(error = %e, "session entry failed"),
                Err(e) => tracing::warn!(error = %e, "session entry task failed"),
            }
        }

        if self.state.is_none() {
            return Ok(Vec::new());
        }

        let entries = match self.snapshot_shields(now).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "shield snapshot failed");
                Vec::new()
            }
        };

        if let Some(mut state) = self.state.take() {
            tracing::info!(session = %state.session_id, steps = state.item_counter, "session exited");
            state.clear();
        }
        Ok(entries)
    }

    fn cancel_entry(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.token.cancel();
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::{Node, ReviewUnit, TagId};
    use crate::id::now_ms;
    use crate::domain::schema::{INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, SLOT_PRIORITY};
    use crate::graph::MemoryGraph;
    use crate::priority::PriorityResolver;
    use crate::scheduler::select::{Interleave, QueueMode};
    use crate::storage::MemoryStorage;

    /// Graph whose subtree walks always fail.
    struct BrokenTraversal(MemoryGraph);

    #[async_trait]
    impl GraphAccess for BrokenTraversal {
        async fn node(&self, id: &str) -> Result<Option<Node>> {
            self.0.node(id).await
        }

        async fn children(&self, id: &str) -> Result<Vec<NodeId>> {
            self.0.children(id).await
        }

        async fn referencing(&self, id: &str) -> Result<Vec<NodeId>> {
            self.0.referencing(id).await
        }

        async fn set_tag_slot(&self, id: &str, tag: &str, slot: &str, value: &str) -> Result<()> {
            self.0.set_tag_slot(id, tag, slot, value).await
        }

        async fn remove_tag(&self, id: &str, tag: &str) -> Result<()> {
            self.0.remove_tag(id, tag).await
        }

        async fn nodes_with_tag(&self, tag: &str) -> Result<Vec<NodeId>> {
            self.0.nodes_with_tag(tag).await
        }

        async fn nodes_with_review_units(&self) -> Result<Vec<NodeId>> {
            self.0.nodes_with_review_units().await
        }

        async fn schema_slot_tags(&self) -> Result<Option<HashSet<TagId>>> {
            self.0.schema_slot_tags().await
        }

        async fn descendants(&self, id: &str) -> Result<Vec<NodeId>> {
            Err(ReviewqError::Graph(format!("traversal of {id} unavailable")))
        }
    }

    fn item_node(id: &str, priority: u8) -> Node {
        Node::new(id)
            .with_tag_slot(INCREMENTAL_TAG, SLOT_PRIORITY, priority.to_string())
            .with_tag_slot(INCREMENTAL_TAG, SLOT_NEXT_REP_DATE, "0")
    }

    fn nodes() -> MemoryGraph {
        MemoryGraph::from_nodes([
            Node::new("doc"),
            item_node("in-doc", 40).with_parent("doc"),
            item_node("elsewhere", 5),
        ])
    }

    fn manager() -> SessionManager<MemoryStorage, MemoryStorage> {
        manager_over(Arc::new(nodes()))
    }

    fn manager_over(graph: Arc<dyn GraphAccess>) -> SessionManager<MemoryStorage, MemoryStorage> {
        let scopes = Arc::new(ScopeResolver::new(graph.clone()));
        let scheduler = QueueScheduler::new(graph.clone(), scopes.clone())
            .with_interleave(Interleave::IncrementalOnly)
            .with_seed(1);
        let resolver = Arc::new(PriorityResolver::new(graph.clone()));
        let cache = PriorityCache::new(resolver, Arc::new(MemoryStorage::new()), Duration::from_secs(60));
        let history = ShieldHistory::new(Arc::new(MemoryStorage::new()));
        SessionManager::new(graph, scopes, scheduler, cache, history)
    }

    #[tokio::test]
    async fn test_scoped_session_only_sees_scope() {
        let mut manager = manager();
        manager.enter(Some("doc".to_string()));
        let items = load_incremental_items(manager.graph.as_ref()).await.unwrap();
        let request = SelectRequest::new(QueueMode::Due, 100);

        let first = manager.next(&items, &request).await.unwrap();
        assert_eq!(first.item().unwrap().node_id, "in-doc");
        assert_eq!(manager.next(&items, &request).await.unwrap(), Selection::Continue);

        let scope = manager.session().unwrap().scope_ids.clone().unwrap();
        assert!(scope.contains("doc"));
        assert!(!scope.contains("elsewhere"));
    }

    #[tokio::test]
    async fn test_exit_snapshots_kb_and_scope() {
        let mut manager = manager();
        manager.enter(Some("doc".to_string()));
        manager.ready().await;

        let entries = manager.exit(100).await.unwrap();
        assert_eq!(entries.len(), 4);
        assert!(!manager.is_active());

        let kb = manager.history().history(KB_SCOPE, ItemKind::Incremental).unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(kb[0].record.absolute, Some(5));

        let scoped = manager.history().history("doc", ItemKind::Incremental).unwrap();
        assert_eq!(scoped[0].record.absolute, Some(40));
    }

    #[tokio::test]
    async fn test_seen_items_leave_the_shield() {
        let mut manager = manager();
        manager.enter(None);
        let items = load_incremental_items(manager.graph.as_ref()).await.unwrap();
        let request = SelectRequest::new(QueueMode::Due, 100);
        manager.next(&items, &request).await.unwrap();
        manager.next(&items, &request).await.unwrap();
        manager.mark_card_seen("some-card").unwrap();

        let reports = manager.shield_reports(100).await.unwrap();
        assert!(reports[0].kb.is_full());
    }

    #[tokio::test]
    async fn test_exit_during_entry() {
        let mut manager = manager();
        manager.enter(Some("doc".to_string()));
        let entries = manager.exit(100).await.unwrap();
        assert!(!manager.is_active());
        assert!(!manager.is_entering());
        assert!(entries.iter().all(|e| e.scope == KB_SCOPE || e.scope == "doc"));
    }

    #[tokio::test]
    async fn test_failed_scope_does_not_end_session() {
        let graph: Arc<dyn GraphAccess> = Arc::new(BrokenTraversal(nodes()));
        let mut manager = manager_over(graph.clone());
        manager.enter(Some("doc".to_string()));
        let items = load_incremental_items(graph.as_ref()).await.unwrap();
        let request = SelectRequest::new(QueueMode::Due, 100);

        for _ in 0..3 {
            assert_eq!(manager.next(&items, &request).await.unwrap(), Selection::Continue);
        }
        assert!(manager.is_active());
        assert!(manager.session().unwrap().scope_ids.is_none());

        let entries = manager.exit(100).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.scope == KB_SCOPE));
        let kb = manager.history().history(KB_SCOPE, ItemKind::Incremental).unwrap();
        assert_eq!(kb[0].record.absolute, Some(5));
    }

    #[tokio::test]
    async fn test_card_shield_recounts_due_units() {
        let soon = now_ms() + 3_600_000;
        let graph = Arc::new(MemoryGraph::from_nodes([
            Node::new("later-card").with_review_unit(ReviewUnit::new("u1", soon)),
            Node::new("gone-card").with_review_unit(ReviewUnit::new("u2", 0)),
        ]));
        let mut manager = manager_over(graph.clone());
        manager.cache.build_optimized(10).await.unwrap();
        let cached = manager.cache.get("later-card").await.unwrap();
        assert_eq!(cached.due_unit_count, 0);

        graph.remove("gone-card");
        manager.enter(None);

        let before = manager.shield_reports(soon - 1).await.unwrap();
        assert!(before[1].kb.is_full());
        assert_eq!(before[1].kb.universe_size, 1);

        let after = manager.shield_reports(soon + 1).await.unwrap();
        assert_eq!(after[1].kind, ItemKind::Card);
        assert_eq!(after[1].kb.absolute, Some(50));
    }

    #[tokio::test]
    async fn test_next_without_session_is_error() {
        let mut manager = manager();
        let request = SelectRequest::new(QueueMode::Due, 100);
        let err = manager.next(&[], &request).await.unwrap_err();
        assert!(matches!(err, ReviewqError::InvalidState(_)));
        assert!(manager.exit(100).await.unwrap().is_empty());
    }
}
