//! Error types for the policy store.
//!
//! Every error surfaces to the immediate caller. Nothing is retried here.

use policy_model::ModelError;
use thiserror::Error;

/// Failures of the underlying ordered key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare storage location: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),
}

/// Errors returned by [`crate::PolicyAdapter`] operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("fieldIndex != 0: adapter only supports filter by prefix (got {field_index})")]
    UnsupportedFilter { field_index: usize },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid value {value:?}: must not contain {separator:?} or start or end with ':'")]
    InvalidField {
        value: String,
        separator: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bootstrap policy parse error on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl AdapterError {
    /// True for the errors that reject an operation the store cannot perform.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            AdapterError::UnsupportedFilter { .. } | AdapterError::UnsupportedOperation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
