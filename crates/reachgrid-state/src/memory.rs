//! MemoryStorage — comparator-ordered in-memory storage.
//!
//! Entries live in a `BTreeMap` behind one `RwLock`. Keys are wrapped so
//! the map orders them with the caller's comparator instead of `Ord`.
//! Compare-and-delete holds the write lock across the read, compare, and
//! remove, so racing callers cannot both observe a match.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::error::{StorageError, StorageResult};
use crate::storage::{KeyComparator, KvStorage, StorageView, Upsert};

/// A key carrying the comparator that orders it.
struct OrderedKey<K> {
    key: K,
    cmp: KeyComparator<K>,
}

impl<K> PartialEq for OrderedKey<K> {
    fn eq(&self, other: &Self) -> bool {
        (self.cmp)(&self.key, &other.key) == Ordering::Equal
    }
}

impl<K> Eq for OrderedKey<K> {}

impl<K> PartialOrd for OrderedKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for OrderedKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&self.key, &other.key)
    }
}

type Entries<K, V> = BTreeMap<OrderedKey<K>, V>;

/// Shared state behind both the store and its live views.
struct Inner<K, V> {
    entries: RwLock<Entries<K, V>>,
    cmp: KeyComparator<K>,
}

impl<K: Clone, V> Inner<K, V> {
    fn probe(&self, key: &K) -> OrderedKey<K> {
        OrderedKey {
            key: key.clone(),
            cmp: self.cmp.clone(),
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Entries<K, V>>> {
        self.entries
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Entries<K, V>>> {
        self.entries
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}

/// Thread-safe in-memory storage ordered by a caller-supplied comparator.
///
/// `Clone` shares the same entries.
pub struct MemoryStorage<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MemoryStorage<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> MemoryStorage<K, V> {
    pub fn new(cmp: KeyComparator<K>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(BTreeMap::new()),
                cmp,
            }),
        }
    }
}

impl<K, V> KvStorage<K, V> for MemoryStorage<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    type View = MemoryView<K, V>;

    fn get(&self, key: &K) -> StorageResult<Option<V>> {
        let entries = self.inner.read()?;
        Ok(entries.get(&self.inner.probe(key)).cloned())
    }

    fn set(&self, key: K, value: V) -> StorageResult<()> {
        let mut entries = self.inner.write()?;
        entries.insert(
            OrderedKey {
                key,
                cmp: self.inner.cmp.clone(),
            },
            value,
        );
        Ok(())
    }

    fn set_unless(&self, key: K, value: V, keep: &dyn Fn(&V) -> bool) -> StorageResult<Upsert<V>> {
        let probe = OrderedKey {
            key,
            cmp: self.inner.cmp.clone(),
        };
        let mut entries = self.inner.write()?;
        if let Some(current) = entries.get(&probe) {
            if keep(current) {
                return Ok(Upsert::Kept(current.clone()));
            }
        }
        Ok(Upsert::Written(entries.insert(probe, value)))
    }

    fn del(&self, key: &K) -> StorageResult<()> {
        let mut entries = self.inner.write()?;
        entries.remove(&self.inner.probe(key));
        Ok(())
    }

    fn del_if(&self, key: &K, expected: &V) -> StorageResult<bool> {
        let probe = self.inner.probe(key);
        let mut entries = self.inner.write()?;
        let matches = entries.get(&probe).is_some_and(|current| current == expected);
        if matches {
            entries.remove(&probe);
        }
        trace!(removed = matches, "conditional delete");
        Ok(matches)
    }

    fn keys(&self) -> StorageResult<Vec<K>> {
        let entries = self.inner.read()?;
        Ok(entries.keys().map(|k| k.key.clone()).collect())
    }

    fn all(&self) -> MemoryView<K, V> {
        MemoryView {
            inner: self.inner.clone(),
        }
    }
}

/// Live view over a [`MemoryStorage`].
pub struct MemoryView<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> StorageView<K, V> for MemoryView<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> StorageResult<Option<V>> {
        let entries = self.inner.read()?;
        Ok(entries.get(&self.inner.probe(key)).cloned())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.inner.read()?.len())
    }

    fn entries(&self) -> StorageResult<Vec<(K, V)>> {
        let entries = self.inner.read()?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.key.clone(), v.clone()))
            .collect())
    }
}
