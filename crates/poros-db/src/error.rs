//! Error types for the storage layer.

/// Errors from directory and audit-log store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[error("store connection checkout failed: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization or deserialization of a stored column failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An agent with this id is already registered.
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),
}
