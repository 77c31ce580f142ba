//! SQLite-backed ordered store.
//!
//! Every collection is a `WITHOUT ROWID` table keyed by a BLOB primary key.
//! Table names are `kv_` plus the hex of the collection name, since SQLite
//! identifiers compare case-insensitively and collection names do not.
//! SQLite compares BLOBs with `memcmp`, so key order is raw byte order.
//! The single connection lives behind a mutex: write transactions are
//! serialized, and in this backend read transactions are as well.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{check_collection_name, Cursor, Entry, KvStore, ReadTxn, WriteTxn};
use crate::config::StorageConfig;
use crate::error::StorageError;

/// Ordered key-value store persisted in a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.is_in_memory() {
            return Self::open_in_memory();
        }

        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wraps an already opened connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

/// Table identifier for a collection.
fn table_name(name: &str) -> String {
    let hex: String = name.bytes().map(|b| format!("{:02x}", b)).collect();
    format!("kv_{}", hex)
}

fn ensure_collection(conn: &Connection, name: &str) -> Result<(), StorageError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name(name)],
            |_| Ok(()),
        )
        .optional()?;

    match exists {
        Some(()) => Ok(()),
        None => Err(StorageError::CollectionNotFound(name.to_string())),
    }
}

impl KvStore for SqliteStore {
    fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        check_collection_name(name)?;
        let conn = self.conn.lock();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key   BLOB PRIMARY KEY NOT NULL,
                value BLOB NOT NULL
            ) WITHOUT ROWID;",
            table_name(name)
        ))?;
        Ok(())
    }

    fn view<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn ReadTxn) -> Result<T, E>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StorageError::from)?;
        ensure_collection(&tx, name)?;

        let out = f(&SqliteTxn::new(&tx, name))?;

        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    fn update<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn WriteTxn) -> Result<T, E>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        ensure_collection(&tx, name)?;

        // Dropping `tx` on the error path rolls the transaction back.
        let out = f(&mut SqliteTxn::new(&tx, name))?;

        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }
}

// ================================================================================================
// TRANSACTIONS & CURSOR
// ================================================================================================

struct SqliteTxn<'a> {
    conn: &'a Connection,
    table: String,
}

impl<'a> SqliteTxn<'a> {
    fn new(conn: &'a Connection, name: &str) -> Self {
        Self {
            conn,
            table: table_name(name),
        }
    }
}

impl ReadTxn for SqliteTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .prepare_cached(&format!("SELECT value FROM {} WHERE key = ?1", self.table))?
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn cursor(&self) -> Box<dyn Cursor + '_> {
        Box::new(SqliteCursor {
            conn: self.conn,
            table: &self.table,
            current: None,
        })
    }
}

impl WriteTxn for SqliteTxn<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.conn
            .prepare_cached(&format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                self.table
            ))?
            .execute(params![key, value])?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.conn
            .prepare_cached(&format!("DELETE FROM {} WHERE key = ?1", self.table))?
            .execute(params![key])?;
        Ok(())
    }
}

/// Cursor that re-queries from its last key on every step, so it holds no
/// open statement between calls.
struct SqliteCursor<'a> {
    conn: &'a Connection,
    table: &'a str,
    current: Option<Vec<u8>>,
}

impl SqliteCursor<'_> {
    fn step(
        &mut self,
        condition: &str,
        bound: Option<&[u8]>,
    ) -> Result<Option<Entry>, StorageError> {
        let sql = format!(
            "SELECT key, value FROM {} {} ORDER BY key LIMIT 1",
            self.table, condition
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Entry> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let entry = match bound {
            Some(bound) => stmt.query_row(params![bound], map_row).optional()?,
            None => stmt.query_row([], map_row).optional()?,
        };

        self.current = entry.as_ref().map(|(k, _)| k.clone());
        Ok(entry)
    }
}

impl Cursor for SqliteCursor<'_> {
    fn first(&mut self) -> Result<Option<Entry>, StorageError> {
        self.step("", None)
    }

    fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>, StorageError> {
        self.step("WHERE key >= ?1", Some(key))
    }

    fn next(&mut self) -> Result<Option<Entry>, StorageError> {
        match self.current.take() {
            Some(current) => self.step("WHERE key > ?1", Some(current.as_slice())),
            None => self.first(),
        }
    }
}
