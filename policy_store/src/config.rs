//! Adapter and storage configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{AdapterError, Result};
use crate::key::KeyStrategy;

// ================================================================================================
// ADAPTER CONFIGURATION
// ================================================================================================

/// Configuration for a [`crate::PolicyAdapter`].
///
/// `collection` is required. The key strategy is fixed for the lifetime of a
/// collection: records written under one strategy are not found under the
/// other.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Name of the collection holding the rule records
    pub collection: String,
    /// Storage key derivation
    pub key_strategy: KeyStrategy,
    /// CSV rule lines loaded into the model before stored rules
    pub bootstrap_policy: Option<String>,
}

impl AdapterConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn with_bootstrap_policy(mut self, policy: impl Into<String>) -> Self {
        self.bootstrap_policy = Some(policy.into());
        self
    }

    /// Parses a JSON configuration such as
    /// `{"collection": "casbin", "key_strategy": "digest"}`.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AdapterError::Configuration(format!("Invalid adapter config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(AdapterError::Configuration(
                "must provide a collection name".to_string(),
            ));
        }
        Ok(())
    }
}

// ================================================================================================
// STORAGE CONFIGURATION
// ================================================================================================

const IN_MEMORY_PATH: &str = ":memory:";

/// Configuration for the SQLite-backed store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file, or `:memory:`
    pub path: PathBuf,
}

impl StorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A private in-memory database that lives as long as its store.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./var/data/policy.db"),
        }
    }
}
