//! reachgrid-state — ordered registry storage for ReachGrid.
//!
//! Every backend implements [`KvStorage`]: point get/set/delete, atomic
//! compare-and-delete and conditional upsert, key listing in comparator
//! order, and a live view over all entries. Callers depend on the trait only, so the in-memory
//! store and the redb-backed store are interchangeable.
//!
//! # Backends
//!
//! - **`MemoryStorage`** — comparator-ordered map behind a single `RwLock`.
//!   Cheap enough for hot dispatch paths; never touches I/O.
//! - **`RedbStorage`** — one redb table with JSON-serialized keys and values.
//!   Compare-and-delete and conditional upsert each run inside a single
//!   write transaction.
//!
//! Key order is supplied by the caller as a [`KeyComparator`] rather than
//! taken from `Ord`, since registration keys have no single canonical order.

pub mod disk;
pub mod error;
pub mod memory;
pub mod storage;

pub use disk::RedbStorage;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use storage::{KeyComparator, KvStorage, StorageView, Upsert, natural_order};
