use crate::schema::ValidationError;
use thiserror::Error;

/// Failures of a single store operation.
///
/// Nothing here is fatal to the process: every variant is local to the call
/// that produced it. An aggregation that yields no rows is not an error and
/// never shows up here.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record rejected before any write
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Bad connection string, unreachable or unreadable database
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("duplicate key: a startup named '{name}' already exists")]
    DuplicateKey { name: String },

    #[error("no startup named '{name}'")]
    NotFound { name: String },

    #[error("invalid collection name '{0}': use letters, digits and underscores")]
    InvalidCollection(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the store rejected the write because of the unique `name` index.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
