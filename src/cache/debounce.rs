//! Debounce window for cache updates.
//!
//! Writers push into a pending map keyed by node id and poke the timer task
//! through a channel. The task restarts its window on every trigger and fires
//! once the window passes quietly.
//!
//! Signals are sent while the pending lock is held, so the channel sees them in
//! the same order the map changed: the last message is a `Trigger` whenever
//! anything is pending.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use super::patch::{Patch, PendingUpdate};
use crate::domain::NodeId;
use crate::error::{Result, ReviewqError};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceMsg {
    /// A new update arrived; restart the window
    Trigger,
    /// Pending updates were taken by an explicit flush
    Cancel,
}

#[derive(Debug)]
pub struct DebounceController {
    pending: Mutex<HashMap<NodeId, PendingUpdate>>,
    tx: mpsc::UnboundedSender<DebounceMsg>,
}

impl DebounceController {
    /// Create the controller and the receiving end its timer task consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DebounceMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            pending: Mutex::new(HashMap::new()),
            tx,
        };
        (controller, rx)
    }

    /// Queue an update, collapsing it with any pending one for the same node.
    pub fn push(&self, node_id: &str, is_light: bool, patch: Patch) -> Result<()> {
        let update = PendingUpdate::new(is_light, patch);
        let mut pending = self.pending.lock().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let merged = match pending.remove(node_id) {
            Some(existing) => existing.merge(update),
            None => update,
        };
        pending.insert(node_id.to_string(), merged);
        self.signal(DebounceMsg::Trigger);
        Ok(())
    }

    /// Take everything pending and stop the running window.
    pub fn take(&self) -> Result<HashMap<NodeId, PendingUpdate>> {
        let mut pending = self.pending.lock().map_err(|e| ReviewqError::Storage(e.to_string()))?;
        let drained = std::mem::take(&mut *pending);
        self.signal(DebounceMsg::Cancel);
        Ok(drained)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn signal(&self, msg: DebounceMsg) {
        // Closed channel just means no timer task is running
        if self.tx.send(msg).is_err() {
            tracing::trace!(?msg, "debounce task not running");
        }
    }
}

/// Timer loop: wait for a trigger, then call `fire` once `window` passes with no
/// further trigger. A `Cancel` drops the running window. Ends when every sender is gone.
pub async fn run_debounce<F, Fut>(mut rx: mpsc::UnboundedReceiver<DebounceMsg>, window: Duration, mut fire: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    'idle: loop {
        match rx.recv().await {
            None => return,
            Some(DebounceMsg::Cancel) => continue 'idle,
            Some(DebounceMsg::Trigger) => {}
        }

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    None => return,
                    Some(DebounceMsg::Trigger) => continue,
                    Some(DebounceMsg::Cancel) => continue 'idle,
                },
                _ = tokio::time::sleep(window) => {
                    tracing::debug!(window_ms = window.as_millis() as u64, "debounce window elapsed");
                    fire().await;
                    continue 'idle;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_push_collapses_same_key() {
        let (controller, _rx) = DebounceController::new();
        controller.push("a", true, Patch::NeedsFetch("a".to_string())).unwrap();
        controller.push("a", false, Patch::NeedsFetch("a".to_string())).unwrap();
        controller.push("b", true, Patch::NeedsFetch("b".to_string())).unwrap();
        assert_eq!(controller.len(), 2);

        let taken = controller.take().unwrap();
        assert!(!taken["a"].is_light);
        assert!(taken["b"].is_light);
        assert!(controller.is_empty());
    }

    #[test]
    fn test_push_sends_trigger() {
        let (controller, mut rx) = DebounceController::new();
        controller.push("a", true, Patch::NeedsFetch("a".to_string())).unwrap();
        controller.take().unwrap();
        assert_eq!(rx.try_recv().unwrap(), DebounceMsg::Trigger);
        assert_eq!(rx.try_recv().unwrap(), DebounceMsg::Cancel);
    }

    #[test]
    fn test_concurrent_push_and_take_leave_trigger_last() {
        let (controller, mut rx) = DebounceController::new();
        let controller = Arc::new(controller);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("n{w}-{i}");
                        controller.push(&id, i % 2 == 0, Patch::NeedsFetch(id.clone())).unwrap();
                    }
                })
            })
            .collect();
        let flusher = {
            let controller = controller.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    controller.take().unwrap();
                }
            })
        };
        for writer in writers {
            writer.join().unwrap();
        }
        flusher.join().unwrap();

        let mut last = None;
        while let Ok(msg) = rx.try_recv() {
            last = Some(msg);
        }
        if controller.is_empty() {
            assert_eq!(last, Some(DebounceMsg::Cancel));
        } else {
            assert_eq!(last, Some(DebounceMsg::Trigger));
        }
    }

    #[tokio::test]
    async fn test_push_after_flush_still_fires() {
        let (controller, rx) = DebounceController::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = tokio::spawn(run_debounce(rx, Duration::from_millis(20), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        controller.push("a", true, Patch::NeedsFetch("a".to_string())).unwrap();
        controller.take().unwrap();
        controller.push("b", true, Patch::NeedsFetch("b".to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(controller.len(), 1);

        drop(controller);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_fires_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = tokio::spawn(run_debounce(rx, Duration::from_millis(30), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        for _ in 0..5 {
            tx.send(DebounceMsg::Trigger).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_window() {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = tokio::spawn(run_debounce(rx, Duration::from_millis(30), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tx.send(DebounceMsg::Trigger).unwrap();
        tx.send(DebounceMsg::Cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        drop(tx);
        task.await.unwrap();
    }
}
