//! Queue scheduling for review sessions.
//!
//! This module provides:
//! - **QueueScheduler**: decides, step by step, whether an incremental item is
//!   shown in place of an ordinary review unit, and which one.
//! - **CooldownState**: global pause on incremental items.
//! - **SessionManager**: session entry/exit around the scheduler, including
//!   scope materialization and shield snapshots.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = QueueScheduler::new(graph.clone(), scopes.clone()).with_interleave(Interleave::Every(3));
//! let mut session = QueueSessionState::new(None);
//! let request = SelectRequest::new(QueueMode::Due, now_ms());
//!
//! match scheduler.select_next(&mut session, &items, &request).await? {
//!     Selection::Item(item) => show(item),
//!     Selection::Continue => show_next_card(),
//! }
//! ```

mod cooldown;
mod select;
mod session;

pub use cooldown::CooldownState;
pub use select::{Interleave, QueueMode, QueueScheduler, SelectRequest, Selection, partial_shuffle};
pub use session::SessionManager;
