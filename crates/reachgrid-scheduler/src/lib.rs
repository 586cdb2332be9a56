//! reachgrid-scheduler — instance reachability and dispatch state.
//!
//! Tracks, for every registered worker instance, which cluster member owns
//! its live connection, whether it can be reached from a given member, and
//! renders the audit trail of execution-plan state transitions.
//!
//! # Architecture
//!
//! ```text
//! InstanceRegistry
//!   ├── KvStorage<RegistrationKey, StoredPacking> (ordered store, identity values)
//!   ├── apply(InstanceChangedEvent) → register / deregister
//!   └── reachable_from(member) → sorted dispatch candidates
//!
//! InstancePacking
//!   ├── immutable registration fields (key, times, channel, connection id)
//!   └── atomic cell (removed flag, last connect failure)
//!
//! Transition → ProcessLog (message rendered once, at the transition)
//! ```

pub mod error;
pub mod event;
pub mod log;
pub mod packing;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use event::{InstanceChangeKind, InstanceChangedEvent};
pub use log::{LogParser, Process, ProcessLog, Transition};
pub use packing::{CONNECT_COOLDOWN_MS, InstancePacking};
pub use registry::{InstanceRegistry, StoredPacking};
