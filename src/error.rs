//! Error types for reviewq
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in reviewq
#[derive(Debug, Error)]
pub enum ReviewqError {
    /// Node not found in the knowledge graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Record not found in a storage collection
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Graph facade error
    #[error("Graph error: {0}")]
    Graph(String),

    /// Operation was cancelled before it finished
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReviewqError {
    /// Whether this error came from a cancellation token firing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReviewqError::Cancelled(_))
    }
}

/// Result type alias for reviewq operations
pub type Result<T> = std::result::Result<T, ReviewqError>;
