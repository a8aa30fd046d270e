//! Priority resolution across the node tree.

mod resolver;

pub use resolver::{DEFAULT_PRIORITY, PriorityResolver, read_record, record_for};
