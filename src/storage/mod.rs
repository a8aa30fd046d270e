//! Key-value persistence for reviewq.
//!
//! Two tiers sit behind the same [`Storage`] trait:
//! - **Durable** ([`JsonlStorage`]): JSONL files that survive across sessions
//!   (shield history).
//! - **Session** ([`MemoryStorage`]): process-lifetime store (priority cache snapshot).
//!
//! Durable data is isolated per knowledge graph under a directory named after a
//! hash of the graph's location.

mod jsonl;
mod memory;
mod traits;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, ReviewqError};

pub use jsonl::JsonlStorage;
pub use memory::MemoryStorage;
pub use traits::{Filter, HasId, Storage};

/// Compute a hash of the graph location for storage isolation.
pub fn compute_graph_hash(graph_path: &Path) -> Result<String> {
    let canonical = graph_path.canonicalize().map_err(|e| {
        ReviewqError::Storage(format!("Failed to canonicalize path {}: {}", graph_path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let result = hasher.finalize();

    // First 16 hex chars
    Ok(hex::encode(&result[..8]))
}

/// Durable store directory for one graph: `<data_dir>/<graph-hash>/`.
pub fn durable_dir(data_dir: &Path, graph_path: &Path) -> Result<PathBuf> {
    Ok(data_dir.join(compute_graph_hash(graph_path)?))
}
