//! The storage contract shared by all backends.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::StorageResult;

/// Total order over keys, supplied by whoever owns the store.
pub type KeyComparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Comparator using the key type's own `Ord`.
pub fn natural_order<K: Ord + 'static>() -> KeyComparator<K> {
    Arc::new(|a: &K, b: &K| a.cmp(b))
}

/// Outcome of [`KvStorage::set_unless`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<V> {
    /// The new value was stored; carries the value it replaced, if any.
    Written(Option<V>),
    /// The current value was kept; carries it.
    Kept(V),
}

/// Concurrent key-value storage ordered by a [`KeyComparator`].
///
/// Every operation is safe to call from many threads without external
/// locking. Operations on one key are atomic with respect to each other;
/// nothing is promised across keys.
pub trait KvStorage<K, V>: Send + Sync {
    /// Live view type returned by [`KvStorage::all`].
    type View: StorageView<K, V>;

    /// Look up a key. A missing key is `Ok(None)`.
    fn get(&self, key: &K) -> StorageResult<Option<V>>;

    /// Insert or replace. Concurrent writers to one key settle on one of
    /// their values; which one is unspecified.
    fn set(&self, key: K, value: V) -> StorageResult<()>;

    /// Store `value` unless `keep` returns `true` for the current value.
    ///
    /// The read, the decision and the write are one atomic step; no other
    /// writer lands between them. An absent key is always written.
    fn set_unless(&self, key: K, value: V, keep: &dyn Fn(&V) -> bool) -> StorageResult<Upsert<V>>;

    /// Remove a key. No-op if absent.
    fn del(&self, key: &K) -> StorageResult<()>;

    /// Remove `key` only if its current value equals `expected`.
    ///
    /// The read, compare, and remove happen as one atomic step. Never
    /// updates the entry. Returns `true` if this call removed it.
    fn del_if(&self, key: &K, expected: &V) -> StorageResult<bool>;

    /// Keys in comparator order. Safe to call during concurrent mutation;
    /// not a point-in-time snapshot across the whole store.
    fn keys(&self) -> StorageResult<Vec<K>>;

    /// A view over every entry that reflects later mutations.
    fn all(&self) -> Self::View;
}

/// Read access to the current contents of a store.
///
/// Each call observes the store as it is at that moment; the view is
/// not a copy taken when it was created.
pub trait StorageView<K, V>: Send + Sync {
    fn get(&self, key: &K) -> StorageResult<Option<V>>;

    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries in comparator order.
    fn entries(&self) -> StorageResult<Vec<(K, V)>>;

    fn values(&self) -> StorageResult<Vec<V>> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }
}
