//! In-memory ordered store for tests and embedded use.
//!
//! Each collection is a `BTreeMap` behind an `Arc`. Readers clone the `Arc`
//! and work on that snapshot without holding any lock. A writer takes the
//! writer mutex and stages its puts and deletes in an overlay on top of the
//! current map. Commit applies the overlay through `Arc::make_mut`, which
//! only copies the map while a reader still holds the old snapshot. An
//! aborted transaction drops the overlay and leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{check_collection_name, Cursor, Entry, KvStore, ReadTxn, WriteTxn};
use crate::error::StorageError;

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// Pending writes of one transaction. `None` marks a delete.
type Staged = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Ordered key-value store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<Tree>>>,
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, name: &str) -> Result<Arc<Tree>, StorageError> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))
    }
}

impl KvStore for MemoryStore {
    fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        check_collection_name(name)?;
        let _writer = self.writer.lock();
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Tree::new()));
        Ok(())
    }

    fn view<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn ReadTxn) -> Result<T, E>,
    {
        let snapshot = self.snapshot(name)?;
        f(&TreeTxn { tree: &snapshot })
    }

    fn update<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn WriteTxn) -> Result<T, E>,
    {
        let _writer = self.writer.lock();

        let mut txn = MemoryWriteTxn {
            base: self.snapshot(name)?,
            staged: Staged::new(),
        };
        let out = f(&mut txn)?;

        let MemoryWriteTxn { base, staged } = txn;
        // Our own handle on the base map would force make_mut to copy it.
        drop(base);

        let mut collections = self.collections.write();
        let tree = collections
            .get_mut(name)
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;
        let tree = Arc::make_mut(tree);
        for (key, value) in staged {
            match value {
                Some(value) => {
                    tree.insert(key, value);
                }
                None => {
                    tree.remove(&key);
                }
            }
        }
        Ok(out)
    }
}

// ================================================================================================
// TRANSACTIONS & CURSOR
// ================================================================================================

struct TreeTxn<'a> {
    tree: &'a Tree,
}

impl ReadTxn for TreeTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.tree.get(key).cloned())
    }

    fn cursor(&self) -> Box<dyn Cursor + '_> {
        Box::new(TreeCursor::new(self.tree, None))
    }
}

struct MemoryWriteTxn {
    base: Arc<Tree>,
    staged: Staged,
}

impl ReadTxn for MemoryWriteTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }

    fn cursor(&self) -> Box<dyn Cursor + '_> {
        Box::new(TreeCursor::new(&self.base, Some(&self.staged)))
    }
}

impl WriteTxn for MemoryWriteTxn {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }
}

/// Walks a map in key order, with an optional overlay of staged writes
/// taking precedence over it.
struct TreeCursor<'a> {
    tree: &'a Tree,
    staged: Option<&'a Staged>,
    current: Option<Vec<u8>>,
}

impl<'a> TreeCursor<'a> {
    fn new(tree: &'a Tree, staged: Option<&'a Staged>) -> Self {
        Self {
            tree,
            staged,
            current: None,
        }
    }

    /// Lands on the first live entry at or after `lower`.
    fn locate(&mut self, mut lower: Bound<Vec<u8>>) -> Option<Entry> {
        let tree = self.tree;
        let staged = self.staged;

        loop {
            let range = (borrow_bound(&lower), Bound::Unbounded);
            let base = tree.range::<[u8], _>(range).next();
            let pending = staged.and_then(|s| s.range::<[u8], _>(range).next());

            let (key, value) = match (base, pending) {
                (None, None) => {
                    self.current = None;
                    return None;
                }
                (Some((k, v)), None) => (k, Some(v)),
                (None, Some((k, v))) => (k, v.as_ref()),
                (Some((bk, bv)), Some((sk, sv))) => {
                    if sk <= bk {
                        (sk, sv.as_ref())
                    } else {
                        (bk, Some(bv))
                    }
                }
            };

            match value {
                Some(value) => {
                    self.current = Some(key.clone());
                    return Some((key.clone(), value.clone()));
                }
                // Deleted in this transaction.
                None => lower = Bound::Excluded(key.clone()),
            }
        }
    }
}

fn borrow_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl Cursor for TreeCursor<'_> {
    fn first(&mut self) -> Result<Option<Entry>, StorageError> {
        Ok(self.locate(Bound::Unbounded))
    }

    fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>, StorageError> {
        Ok(self.locate(Bound::Included(key.to_vec())))
    }

    fn next(&mut self) -> Result<Option<Entry>, StorageError> {
        match self.current.take() {
            Some(current) => Ok(self.locate(Bound::Excluded(current))),
            None => self.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(store: &MemoryStore, name: &str) -> Vec<Vec<u8>> {
        store
            .view(name, |txn| -> Result<_, StorageError> {
                let mut out = Vec::new();
                let mut cursor = txn.cursor();
                let mut entry = cursor.first()?;
                while let Some((k, _)) = entry {
                    out.push(k);
                    entry = cursor.next()?;
                }
                Ok(out)
            })
            .unwrap()
    }

    #[test]
    fn test_create_collection_is_idempotent() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store
            .update("rules", |txn| txn.put(b"a", b"1"))
            .unwrap();
        store.create_collection("rules").unwrap();
        assert_eq!(keys(&store, "rules"), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_missing_collection() {
        let store = MemoryStore::new();
        let err = store
            .view("nope", |txn| txn.get(b"a"))
            .unwrap_err();
        assert!(matches!(err, StorageError::CollectionNotFound(_)));
        assert!(matches!(
            store.create_collection(""),
            Err(StorageError::InvalidCollectionName(_))
        ));
    }

    #[test]
    fn test_cursor_iterates_in_key_order() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store
            .update("rules", |txn| -> Result<(), StorageError> {
                txn.put(b"p::b", b"2")?;
                txn.put(b"g::a", b"3")?;
                txn.put(b"p::a", b"1")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            keys(&store, "rules"),
            vec![b"g::a".to_vec(), b"p::a".to_vec(), b"p::b".to_vec()]
        );

        let sought = store
            .view("rules", |txn| txn.cursor().seek(b"p::"))
            .unwrap();
        assert_eq!(sought, Some((b"p::a".to_vec(), b"1".to_vec())));
    }

    #[test]
    fn test_failed_update_is_rolled_back() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();

        let result = store.update("rules", |txn| -> Result<(), StorageError> {
            txn.put(b"a", b"1")?;
            Err(StorageError::CollectionNotFound("forced".into()))
        });
        assert!(result.is_err());
        assert!(keys(&store, "rules").is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_during_write() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store.update("rules", |txn| txn.put(b"a", b"1")).unwrap();

        store
            .view("rules", |read| -> Result<(), StorageError> {
                store.update("rules", |txn| txn.delete(b"a"))?;
                assert_eq!(read.get(b"a")?, Some(b"1".to_vec()));
                Ok(())
            })
            .unwrap();

        assert!(keys(&store, "rules").is_empty());
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store.update("rules", |txn| txn.delete(b"missing")).unwrap();
    }

    #[test]
    fn test_write_txn_reads_its_own_writes() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store
            .update("rules", |txn| -> Result<(), StorageError> {
                txn.put(b"p::a", b"1")?;
                txn.put(b"p::b", b"2")?;
                txn.put(b"p::c", b"3")?;
                Ok(())
            })
            .unwrap();

        let seen = store
            .update("rules", |txn| -> Result<_, StorageError> {
                txn.delete(b"p::b")?;
                txn.put(b"p::a", b"9")?;
                txn.put(b"p::bb", b"4")?;
                assert_eq!(txn.get(b"p::b")?, None);
                assert_eq!(txn.get(b"p::a")?, Some(b"9".to_vec()));

                let mut out = Vec::new();
                let mut cursor = txn.cursor();
                let mut entry = cursor.seek(b"p::")?;
                while let Some(e) = entry {
                    out.push(e);
                    entry = cursor.next()?;
                }
                Ok(out)
            })
            .unwrap();

        let expected = vec![
            (b"p::a".to_vec(), b"9".to_vec()),
            (b"p::bb".to_vec(), b"4".to_vec()),
            (b"p::c".to_vec(), b"3".to_vec()),
        ];
        assert_eq!(seen, expected);
        assert_eq!(
            keys(&store, "rules"),
            vec![b"p::a".to_vec(), b"p::bb".to_vec(), b"p::c".to_vec()]
        );
    }

    #[test]
    fn test_commit_without_readers_reuses_map() {
        let store = MemoryStore::new();
        store.create_collection("rules").unwrap();
        store.update("rules", |txn| txn.put(b"a", b"1")).unwrap();

        let before = Arc::as_ptr(&store.snapshot("rules").unwrap());
        store.update("rules", |txn| txn.put(b"b", b"2")).unwrap();
        let after = Arc::as_ptr(&store.snapshot("rules").unwrap());

        assert_eq!(before, after);
        assert_eq!(keys(&store, "rules"), vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
