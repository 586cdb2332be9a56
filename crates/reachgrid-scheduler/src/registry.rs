//! InstanceRegistry — registered instances keyed by registration key.
//!
//! Registration events create fresh packings and upsert them into the
//! ordered store with one conditional write, so an older event can never
//! overwrite a newer record. Stored values compare by identity: retiring or
//! purging a record only ever removes that exact record, never a newer one
//! registered under the same key. Dispatch queries read the live view and
//! never touch I/O beyond the store itself.

use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info, warn};

use reach_core::RegistrationKey;
use reachgrid_state::{KvStorage, MemoryStorage, StorageView, Upsert, natural_order};

use crate::error::RegistryResult;
use crate::event::{InstanceChangeKind, InstanceChangedEvent};
use crate::packing::InstancePacking;

/// A packing as held by the store. Equal only to the same allocation.
#[derive(Debug, Clone)]
pub struct StoredPacking(Arc<InstancePacking>);

impl StoredPacking {
    pub fn packing(&self) -> &Arc<InstancePacking> {
        &self.0
    }

    pub fn into_packing(self) -> Arc<InstancePacking> {
        self.0
    }
}

impl From<Arc<InstancePacking>> for StoredPacking {
    fn from(packing: Arc<InstancePacking>) -> Self {
        Self(packing)
    }
}

impl PartialEq for StoredPacking {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StoredPacking {}

impl Deref for StoredPacking {
    type Target = InstancePacking;

    fn deref(&self) -> &InstancePacking {
        &self.0
    }
}

/// Store type used when the registry is purely in-memory.
pub type MemoryRegistryStorage = MemoryStorage<RegistrationKey, StoredPacking>;

/// Registered instances and their reachability, over any [`KvStorage`].
pub struct InstanceRegistry<S> {
    storage: S,
}

impl InstanceRegistry<MemoryRegistryStorage> {
    /// Registry over an in-memory store ordered by registration key.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(natural_order()))
    }
}

impl<S> InstanceRegistry<S>
where
    S: KvStorage<RegistrationKey, StoredPacking>,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Apply one registration change.
    ///
    /// Returns the packing that was stored (registration) or removed
    /// (deregistration). An event older than the stored record for the same
    /// key is ignored and returns `None`.
    pub fn apply(&self, event: &InstanceChangedEvent) -> RegistryResult<Option<Arc<InstancePacking>>> {
        match event.kind {
            InstanceChangeKind::Registered => self.register(event),
            InstanceChangeKind::Deregistered => self.deregister(event),
        }
    }

    fn register(&self, event: &InstanceChangedEvent) -> RegistryResult<Option<Arc<InstancePacking>>> {
        let key = &event.registration_key;
        let packing = Arc::new(InstancePacking::from_event(event));
        let incoming = event.register_time;

        let outcome = self.storage.set_unless(
            key.clone(),
            StoredPacking::from(packing.clone()),
            &|current: &StoredPacking| current.register_time() > incoming,
        )?;

        match outcome {
            Upsert::Kept(current) => {
                debug!(
                    %key,
                    stored = current.register_time(),
                    incoming,
                    "ignoring stale registration"
                );
                Ok(None)
            }
            Upsert::Written(previous) => {
                // Holders of the replaced record must see it as gone.
                if let Some(prev) = previous {
                    prev.mark_removed();
                }
                debug!(
                    %key,
                    source_id = packing.source_id(),
                    channel = %packing.channel(),
                    owner = packing.connected_server_id(),
                    "instance registered"
                );
                Ok(Some(packing))
            }
        }
    }

    fn deregister(&self, event: &InstanceChangedEvent) -> RegistryResult<Option<Arc<InstancePacking>>> {
        let key = &event.registration_key;
        let Some(current) = self.storage.get(key)? else {
            debug!(%key, "deregistration for unknown instance");
            return Ok(None);
        };
        if current.register_time() > event.register_time {
            debug!(
                %key,
                stored = current.register_time(),
                incoming = event.register_time,
                "ignoring stale deregistration"
            );
            return Ok(None);
        }

        let current = current.into_packing();
        if !self.retire(&current)? {
            return Ok(None);
        }
        info!(%key, "instance deregistered");
        Ok(Some(current))
    }

    /// Soft-delete `packing` and remove it from the store if it is still
    /// the stored record. A record already replaced under the same key is
    /// only marked removed; the newer one stays. Returns `true` if this
    /// call removed it.
    pub fn retire(&self, packing: &Arc<InstancePacking>) -> RegistryResult<bool> {
        packing.mark_removed();
        let removed = self
            .storage
            .del_if(packing.registration_key(), &StoredPacking::from(packing.clone()))?;
        debug!(key = %packing.registration_key(), removed, "instance retired");
        Ok(removed)
    }

    /// The live record for `key`. Soft-deleted records are not returned.
    pub fn get(&self, key: &RegistrationKey) -> RegistryResult<Option<Arc<InstancePacking>>> {
        Ok(self
            .storage
            .get(key)?
            .filter(|p| !p.is_removed())
            .map(StoredPacking::into_packing))
    }

    /// Number of stored records, including soft-deleted ones not yet purged.
    pub fn len(&self) -> RegistryResult<usize> {
        Ok(self.storage.all().len()?)
    }

    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop soft-deleted records that are still stored. Returns how many
    /// this call removed.
    pub fn purge_removed(&self) -> RegistryResult<usize> {
        let mut purged = 0;
        for (key, packing) in self.storage.all().entries()? {
            if packing.is_removed() && self.storage.del_if(&key, &packing)? {
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "purged removed instances");
        }
        Ok(purged)
    }

    /// Live records, sorted by register time then key.
    pub fn live(&self) -> RegistryResult<Vec<Arc<InstancePacking>>> {
        let mut live: Vec<Arc<InstancePacking>> = self
            .storage
            .all()
            .values()?
            .into_iter()
            .filter(|p| !p.is_removed())
            .map(StoredPacking::into_packing)
            .collect();
        live.sort();
        Ok(live)
    }

    /// Live records `member_id` can deliver to, in dispatch order.
    pub fn reachable_from(&self, member_id: i64) -> RegistryResult<Vec<Arc<InstancePacking>>> {
        let mut reachable = self.live()?;
        reachable.retain(|p| p.is_reachable(member_id));
        Ok(reachable)
    }

    /// Live records whose connection is owned by `member_id`.
    pub fn owned_by(&self, member_id: i64) -> RegistryResult<Vec<Arc<InstancePacking>>> {
        let mut owned = self.live()?;
        owned.retain(|p| p.connected_server_id() == member_id);
        Ok(owned)
    }

    /// First instance of `service_name` that `member_id` can reach and that
    /// is outside its connect-failure cooldown.
    pub fn select_for_dispatch(
        &self,
        member_id: i64,
        service_name: &str,
    ) -> RegistryResult<Option<Arc<InstancePacking>>> {
        let selected = self
            .reachable_from(member_id)?
            .into_iter()
            .filter(|p| p.registration_key().service_name == service_name)
            .find(|p| p.is_connectable());

        match &selected {
            Some(p) => debug!(member_id, service = service_name, key = %p.registration_key(), "selected instance"),
            None => warn!(member_id, service = service_name, "no reachable instance"),
        }
        Ok(selected)
    }

    /// Record a failed delivery attempt against the live record for `key`.
    pub fn report_connect_failure(&self, key: &RegistrationKey) -> RegistryResult<bool> {
        match self.get(key)? {
            Some(p) => {
                p.connect_failed();
                debug!(%key, "connect failure recorded");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
