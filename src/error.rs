use thiserror::Error;

/// Store backend error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failed mediator transition. The activity is left where it was.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediatorError {
    #[error("failed to persist '{key}' (status {status}): {message}")]
    Persistence {
        key: String,
        status: u16,
        message: String,
    },

    #[error("failed to list '{path}' (status {status}): {message}")]
    TreeListing {
        path: String,
        status: u16,
        message: String,
    },
}

/// Config file error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
