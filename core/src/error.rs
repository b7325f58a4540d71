//! Error types

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// The queue was shut down and no longer accepts jobs
    #[error("queue '{label}' is closed")]
    QueueClosed { label: String },

    #[error("failed to spawn worker for queue '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn queue_closed(label: impl Into<String>) -> Self {
        DispatchError::QueueClosed { label: label.into() }
    }
}
