//! reachgrid-discovery — cluster member address discovery.
//!
//! Keeps the outbound request client pointed at the current set of
//! cluster members. Addresses come from static config and, optionally,
//! from a provider endpoint that is polled in the background.
//!
//! # Architecture
//!
//! ```text
//! ServerAddressesReader
//!   ├── AddressProvider (HTTP(S) GET → newline-delimited list)
//!   ├── background read loop (every 30s, 10s timeout per fetch)
//!   │   ├── parse → sort → dedupe
//!   │   └── changed? → refresh_server_address()
//!   └── RequestClient
//!       └── AddressPicker (RoundRobinBalancer<ServerAddress>, rebuilt per change)
//! ```
//!
//! Fetch failures are logged and retried on the next tick; the last
//! known-good address set stays in effect.

pub mod balancer;
pub mod client;
pub mod error;
pub mod provider;
pub mod reader;

pub use balancer::{AddressPicker, RoundRobinBalancer};
pub use client::{RequestClient, ServerList};
pub use error::{DiscoveryError, DiscoveryResult};
pub use provider::{AddressProvider, BoxFuture, HttpProvider, default_tls_config};
pub use reader::ServerAddressesReader;
