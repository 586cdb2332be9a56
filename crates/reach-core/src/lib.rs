//! reach-core — shared types for ReachGrid.
//!
//! Holds the registration identity types, the transport channel table,
//! the connection-id wire format, server address resolution, and the
//! `reachd.toml` configuration model used by the other crates.

pub mod address;
pub mod config;
pub mod connection;
pub mod types;

pub use address::{RequestSchema, ServerAddress};
pub use config::{ClientConfig, NodeConfig, ReachConfig};
pub use connection::{ConnectionId, UNKNOWN_MEMBER};
pub use types::*;
