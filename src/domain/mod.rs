//! Domain types for reviewq
//!
//! This module contains the core data model:
//! - Node / ReviewUnit: the knowledge graph as seen through the facade
//! - PriorityRecord: cached, rank-annotated priority of one node
//! - IncrementalItem: a node under active incremental scheduling
//! - ShieldRecord: daily shield statistic
//! - QueueSessionState: per-session scheduling state
//! - schema: tag and slot names the engine reads and writes

pub mod incremental;
pub mod node;
pub mod priority_record;
pub mod schema;
pub mod session;
pub mod shield;

pub use incremental::IncrementalItem;
pub use node::{DocumentKind, Node, NodeId, ReviewUnit, TagId};
pub use priority_record::{MAX_PRIORITY, MIN_PRIORITY, PriorityRecord, PrioritySource, Resolution, clamp_priority};
pub use session::{QueueSessionState, ScopeSet};
pub use shield::{ItemKind, ShieldRecord};
