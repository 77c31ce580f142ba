//! # Storage Module
//!
//! The ordered, transactional key-value store the adapter persists into.
//!
//! A store holds named collections. Each collection maps raw byte keys to
//! byte values, ordered lexicographically by key. Work happens inside
//! transactions scoped to one collection:
//! - [`KvStore::view`] runs a read-only transaction on a consistent snapshot
//! - [`KvStore::update`] runs a write transaction that commits when the
//!   closure returns `Ok` and rolls back when it returns `Err`
//!
//! Write transactions are serialized; a second writer blocks until the first
//! finishes.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageError;

/// A key and its value.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Forward cursor over one collection, in key order.
pub trait Cursor {
    /// Positions on the first entry.
    fn first(&mut self) -> Result<Option<Entry>, StorageError>;

    /// Positions on the first entry whose key is `>= key`.
    fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>, StorageError>;

    /// Advances past the current entry. Behaves like `first` on a fresh cursor.
    fn next(&mut self) -> Result<Option<Entry>, StorageError>;
}

/// Read access inside a transaction.
pub trait ReadTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn cursor(&self) -> Box<dyn Cursor + '_>;
}

/// Read-write access inside a write transaction.
pub trait WriteTxn: ReadTxn {
    /// Inserts or overwrites.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Removes a key. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError>;
}

/// An opened ordered key-value store.
pub trait KvStore: Send + Sync {
    /// Creates the collection unless it already exists.
    fn create_collection(&self, name: &str) -> Result<(), StorageError>;

    /// Runs `f` in a read-only transaction on collection `name`.
    fn view<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn ReadTxn) -> Result<T, E>;

    /// Runs `f` in a write transaction on collection `name`.
    ///
    /// Nothing `f` wrote is visible to anyone unless it returns `Ok`.
    fn update<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn WriteTxn) -> Result<T, E>;
}

pub(crate) fn check_collection_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidCollectionName(name.to_string()));
    }
    Ok(())
}

/// Lets several adapters share one opened store.
impl<S: KvStore> KvStore for std::sync::Arc<S> {
    fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        (**self).create_collection(name)
    }

    fn view<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn ReadTxn) -> Result<T, E>,
    {
        (**self).view(name, f)
    }

    fn update<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn WriteTxn) -> Result<T, E>,
    {
        (**self).update(name, f)
    }
}
