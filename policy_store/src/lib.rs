//! # Policy Store Library
//!
//! Persists authorization rules in an ordered, transactional key-value store
//! and implements the [`policy_model::Adapter`] contract on top of it.

// Core modules
pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod key;
pub mod model_bridge;
pub mod record;
pub mod storage;

// Re-export commonly used types
pub use adapter::PolicyAdapter;
pub use bootstrap::{load_bootstrap, parse_bootstrap, BootstrapLine};
pub use config::{AdapterConfig, StorageConfig};
pub use error::{AdapterError, Result, StorageError};
pub use key::{DelimitedKeys, DigestKeys, KeyEncoder, KeyStrategy, KEY_SEPARATOR};
pub use record::StoredRecord;
pub use storage::{KvStore, MemoryStore, SqliteStore};
