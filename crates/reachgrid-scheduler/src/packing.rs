//! InstancePacking — one registered instance as seen by the dispatcher.
//!
//! The registration fields are immutable for the life of the record. A
//! re-registration produces a new packing. Two operational fields change
//! after creation: the soft-delete flag and the time of the most recent
//! failed connection attempt. Both live in an atomic cell so a packing can
//! be shared through `Arc` and queried from any dispatch thread.
//!
//! Equality and hashing use the registration key only. Ordering is by
//! register time, then by the key's string form.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use reach_core::{
    ConnectionId, RegistrationKey, RequestChannel, ServiceInstance, UNKNOWN_MEMBER,
    validate_port,
};

use crate::event::InstanceChangedEvent;

/// Cooldown after a failed connection before the instance is tried again.
pub const CONNECT_COOLDOWN_MS: i64 = 20_000;

/// Mutable operational state. Neither field takes part in equality or
/// ordering, and last-write-wins is acceptable for both.
#[derive(Debug, Default)]
struct OperationalCell {
    removed: AtomicBool,
    /// Milliseconds since the epoch; 0 means no failure recorded.
    last_connect_failed_ms: AtomicI64,
}

#[derive(Debug)]
pub struct InstancePacking {
    instance: ServiceInstance,
    registration_key: RegistrationKey,
    /// Cached string form of `registration_key`, used as the order tie-break.
    key_text: String,
    register_time: i64,
    source_id: i64,
    connection_id: Option<ConnectionId>,
    channel: RequestChannel,
    cell: OperationalCell,
}

impl InstancePacking {
    pub fn new(
        registration_key: RegistrationKey,
        instance: ServiceInstance,
        register_time: i64,
        source_id: i64,
        channel: RequestChannel,
    ) -> Self {
        Self {
            key_text: registration_key.to_string(),
            instance,
            registration_key,
            register_time,
            source_id,
            connection_id: None,
            channel,
            cell: OperationalCell::default(),
        }
    }

    /// Attach the connection id of the owning member. Empty ids are
    /// treated as "no live connection known".
    pub fn with_connection_id(mut self, connection_id: impl Into<ConnectionId>) -> Self {
        let connection_id = connection_id.into();
        self.connection_id = (!connection_id.is_empty()).then_some(connection_id);
        self
    }

    pub fn from_event(event: &InstanceChangedEvent) -> Self {
        let packing = Self::new(
            event.registration_key.clone(),
            event.instance.clone(),
            event.register_time,
            event.source_id,
            event.channel,
        );
        match &event.connection_id {
            Some(id) => packing.with_connection_id(id.as_str()),
            None => packing,
        }
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    pub fn registration_key(&self) -> &RegistrationKey {
        &self.registration_key
    }

    pub fn register_time(&self) -> i64 {
        self.register_time
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn channel(&self) -> RequestChannel {
        self.channel
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    pub fn udp_port(&self) -> i32 {
        self.instance.udp_port
    }

    /// Human-readable description of the instance for audit messages.
    pub fn describe(&self) -> String {
        self.registration_key.instance_key().describe()
    }

    // ── Soft delete ───────────────────────────────────────────────

    pub fn is_removed(&self) -> bool {
        self.cell.removed.load(AtomicOrdering::Acquire)
    }

    pub fn mark_removed(&self) {
        self.cell.removed.store(true, AtomicOrdering::Release);
    }

    // ── Connect failures ──────────────────────────────────────────

    /// Time of the most recent failed attempt, 0 if none.
    pub fn last_connect_failed_time(&self) -> i64 {
        self.cell.last_connect_failed_ms.load(AtomicOrdering::Relaxed)
    }

    pub fn is_connectable(&self) -> bool {
        self.is_connectable_at(now_millis())
    }

    /// Whether the cooldown since the last failure has elapsed at `now_ms`.
    pub fn is_connectable_at(&self, now_ms: i64) -> bool {
        let last = self.last_connect_failed_time();
        last == 0 || now_ms.saturating_sub(last) >= CONNECT_COOLDOWN_MS
    }

    pub fn connect_failed(&self) {
        self.connect_failed_at(now_millis());
    }

    /// Record a failed attempt at `now_ms`. An older timestamp never
    /// overwrites a newer one.
    pub fn connect_failed_at(&self, now_ms: i64) {
        self.cell
            .last_connect_failed_ms
            .fetch_max(now_ms, AtomicOrdering::Relaxed);
    }

    // ── Reachability ──────────────────────────────────────────────

    pub fn udp_available(&self) -> bool {
        validate_port(self.instance.udp_port)
    }

    /// Member owning the live connection, or `-1` when unknown.
    pub fn connected_server_id(&self) -> i64 {
        self.connection_id
            .as_ref()
            .map_or(UNKNOWN_MEMBER, ConnectionId::owner)
    }

    /// Whether `member_id` can deliver to this instance right now.
    ///
    /// The owner of the live connection always can. Instances on a channel
    /// without a persistent stream receiver are reachable over UDP from
    /// any member, provided their UDP port is valid.
    pub fn is_reachable(&self, member_id: i64) -> bool {
        if self
            .connection_id
            .as_ref()
            .is_some_and(|id| id.is_owned_by(member_id))
        {
            return true;
        }
        !self.channel.supports_stream_receiver() && self.udp_available()
    }
}

impl PartialEq for InstancePacking {
    fn eq(&self, other: &Self) -> bool {
        self.registration_key == other.registration_key
    }
}

impl Eq for InstancePacking {}

impl Hash for InstancePacking {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.registration_key.hash(state);
    }
}

/// Register time ascending, then the key's string form.
///
/// Not consistent with `Eq` for two records of the same key registered at
/// different times; the registry holds one record per key, so sorting its
/// contents is still a strict total order.
impl Ord for InstancePacking {
    fn cmp(&self, other: &Self) -> Ordering {
        self.register_time
            .cmp(&other.register_time)
            .then_with(|| self.key_text.cmp(&other.key_text))
    }
}

impl PartialOrd for InstancePacking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
