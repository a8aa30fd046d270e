//! reviewq - priority resolution and scheduling for knowledge-graph review queues
//!
//! reviewq decides how important each node of a knowledge graph is, keeps a
//! percentile-ranked cache of those priorities, and uses it to pick what a
//! review session shows next. It also tracks the "priority shield": the most
//! important item currently left unreviewed.

pub mod cache;
pub mod domain;
pub mod error;
pub mod graph;
pub mod id;
pub mod priority;
pub mod scheduler;
pub mod scope;
pub mod shield;
pub mod storage;

pub use error::{Result, ReviewqError};
