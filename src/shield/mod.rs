//! Priority shield: the worst currently-neglected item, tracked per day.

mod compute;
mod history;

pub use compute::{ShieldItem, ShieldReport, compute_shield};
pub use history::{HISTORY_COLLECTION, KB_SCOPE, ShieldEntry, ShieldHistory};
