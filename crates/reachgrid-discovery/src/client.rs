//! The outbound request client seam.
//!
//! The reader only needs to know which channel the client speaks, which
//! addresses it currently targets, and how to hand it a new picker.
//! Transport clients implement [`RequestClient`]; [`ServerList`] is the
//! in-process implementation that holds the current picker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use reach_core::{RequestChannel, ServerAddress};

use crate::balancer::AddressPicker;

pub trait RequestClient: Send + Sync {
    fn channel(&self) -> RequestChannel;

    /// Addresses the client currently routes to.
    fn addresses(&self) -> Vec<ServerAddress>;

    /// Replace the address picker.
    fn change_addresses(&self, picker: AddressPicker);

    /// Begin serving requests. Calling it again is a no-op.
    fn start(&self);
}

/// Current member addresses for one request channel.
pub struct ServerList {
    channel: RequestChannel,
    picker: RwLock<Arc<AddressPicker>>,
    started: AtomicBool,
    /// Bumped on every address change.
    generation: AtomicU64,
}

impl ServerList {
    pub fn new(channel: RequestChannel) -> Self {
        Self {
            channel,
            picker: RwLock::new(Arc::new(AddressPicker::default())),
            started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Arc<AddressPicker> {
        self.picker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Next member address in round-robin order.
    pub fn next_address(&self) -> Option<ServerAddress> {
        self.current().pick().cloned()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// How many times the address set has been replaced.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl RequestClient for ServerList {
    fn channel(&self) -> RequestChannel {
        self.channel
    }

    fn addresses(&self) -> Vec<ServerAddress> {
        self.current().items().to_vec()
    }

    fn change_addresses(&self, picker: AddressPicker) {
        let count = picker.len();
        *self.picker.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(picker);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(channel = %self.channel, count, generation, "server addresses changed");
    }

    fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            debug!(channel = %self.channel, "request client started");
        }
    }
}
