//! RedbStorage — redb-backed implementation of [`KvStorage`].
//!
//! Keys and values are JSON-serialized: keys into the `&str` key column,
//! values into the `&[u8]` value column of one table. redb serializes
//! write transactions, so compare-and-delete inside a single write
//! transaction is atomic with respect to every other writer.
//!
//! Key identity is the serialized form. The comparator only decides the
//! order in which `keys()` and the live view report entries.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::storage::{KeyComparator, KvStorage, StorageView, Upsert};

/// Convert any `Display` error into a `StorageError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StorageError::$variant(e.to_string())
    };
}

/// Thread-safe storage over one redb table.
pub struct RedbStorage<K, V> {
    db: Arc<Database>,
    table: &'static str,
    cmp: KeyComparator<K>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for RedbStorage<K, V> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table,
            cmp: self.cmp.clone(),
            _types: PhantomData,
        }
    }
}

impl<K, V> RedbStorage<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Open (or create) a database file and use `table` inside it.
    pub fn open(path: &Path, table: &'static str, cmp: KeyComparator<K>) -> StorageResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let storage = Self::with_database(Arc::new(db), table, cmp)?;
        debug!(?path, table, "redb storage opened");
        Ok(storage)
    }

    /// Create an ephemeral in-memory database (for testing).
    pub fn open_in_memory(table: &'static str, cmp: KeyComparator<K>) -> StorageResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let storage = Self::with_database(Arc::new(db), table, cmp)?;
        debug!(table, "in-memory redb storage opened");
        Ok(storage)
    }

    /// Use `table` in an already opened database. Several storages may
    /// share one database as long as their table names differ.
    pub fn with_database(
        db: Arc<Database>,
        table: &'static str,
        cmp: KeyComparator<K>,
    ) -> StorageResult<Self> {
        let storage = Self {
            db,
            table,
            cmp,
            _types: PhantomData,
        };
        storage.ensure_table()?;
        Ok(storage)
    }

    fn definition(&self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        TableDefinition::new(self.table)
    }

    fn ensure_table(&self) -> StorageResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(self.definition()).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn encode_key(key: &K) -> StorageResult<String> {
        serde_json::to_string(key).map_err(map_err!(Serialize))
    }

    fn read_value(&self, key: &K) -> StorageResult<Option<V>> {
        let encoded = Self::encode_key(key)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
        match table.get(encoded.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: V =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn read_entries(&self) -> StorageResult<Vec<(K, V)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key: K = serde_json::from_str(key.value()).map_err(map_err!(Deserialize))?;
            let value: V =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push((key, value));
        }
        results.sort_by(|(a, _), (b, _)| (self.cmp)(a, b));
        Ok(results)
    }
}

impl<K, V> KvStorage<K, V> for RedbStorage<K, V>
where
    K: Serialize + DeserializeOwned + Send + Sync,
    V: Serialize + DeserializeOwned + PartialEq + Send + Sync,
{
    type View = RedbView<K, V>;

    fn get(&self, key: &K) -> StorageResult<Option<V>> {
        self.read_value(key)
    }

    fn set(&self, key: K, value: V) -> StorageResult<()> {
        let encoded = Self::encode_key(&key)?;
        let value = serde_json::to_vec(&value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
            table
                .insert(encoded.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn set_unless(&self, key: K, value: V, keep: &dyn Fn(&V) -> bool) -> StorageResult<Upsert<V>> {
        let encoded = Self::encode_key(&key)?;
        let bytes = serde_json::to_vec(&value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
            let current: Option<V> = match table.get(encoded.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            outcome = match current {
                Some(current) if keep(&current) => Upsert::Kept(current),
                previous => {
                    table
                        .insert(encoded.as_str(), bytes.as_slice())
                        .map_err(map_err!(Write))?;
                    Upsert::Written(previous)
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %encoded, written = matches!(outcome, Upsert::Written(_)), "conditional upsert");
        Ok(outcome)
    }

    fn del(&self, key: &K) -> StorageResult<()> {
        let encoded = Self::encode_key(key)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
            table.remove(encoded.as_str()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn del_if(&self, key: &K, expected: &V) -> StorageResult<bool> {
        let encoded = Self::encode_key(key)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(self.definition()).map_err(map_err!(Table))?;
            let matches = match table.get(encoded.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let current: V =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    current == *expected
                }
                None => false,
            };
            if matches {
                table.remove(encoded.as_str()).map_err(map_err!(Write))?;
            }
            removed = matches;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %encoded, removed, "conditional delete");
        Ok(removed)
    }

    fn keys(&self) -> StorageResult<Vec<K>> {
        Ok(self.read_entries()?.into_iter().map(|(k, _)| k).collect())
    }

    fn all(&self) -> RedbView<K, V> {
        RedbView {
            storage: self.clone(),
        }
    }
}

/// Live view over a [`RedbStorage`]; every call reads the table afresh.
pub struct RedbView<K, V> {
    storage: RedbStorage<K, V>,
}

impl<K, V> StorageView<K, V> for RedbView<K, V>
where
    K: Serialize + DeserializeOwned + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &K) -> StorageResult<Option<V>> {
        self.storage.read_value(key)
    }

    fn len(&self) -> StorageResult<usize> {
        let txn = self.storage.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(self.storage.definition())
            .map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    fn entries(&self) -> StorageResult<Vec<(K, V)>> {
        self.storage.read_entries()
    }
}
