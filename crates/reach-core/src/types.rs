//! Registration identity and instance payload types.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest and highest usable port numbers.
pub const MIN_PORT: i32 = 1;
pub const MAX_PORT: i32 = 65535;

/// Whether a port value received from a worker is usable.
///
/// Ports arrive from registration messages as plain integers, so
/// zero, negative, and out-of-range values are all possible.
pub fn validate_port(port: i32) -> bool {
    (MIN_PORT..=MAX_PORT).contains(&port)
}

// ── Channel ───────────────────────────────────────────────────────

/// Transport channel negotiated when an instance registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestChannel {
    /// Persistent bidirectional stream.
    Grpc,
    /// Plain request/response.
    Http,
}

impl RequestChannel {
    /// Whether the channel keeps a persistent stream open towards the
    /// instance, so requests can be pushed over the owned connection.
    ///
    /// Channels without one fall back to UDP delivery.
    pub fn supports_stream_receiver(self) -> bool {
        match self {
            RequestChannel::Grpc => true,
            RequestChannel::Http => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestChannel::Grpc => "grpc",
            RequestChannel::Http => "http",
        }
    }
}

impl fmt::Display for RequestChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Identity ──────────────────────────────────────────────────────

/// Coordinates of one instance within a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub cluster: String,
    pub ip: String,
    pub port: u16,
}

impl InstanceKey {
    /// Human-readable description used in audit messages.
    pub fn describe(&self) -> String {
        if self.cluster.is_empty() {
            format!("{}:{}", self.ip, self.port)
        } else {
            format!("{}:{}@{}", self.ip, self.port, self.cluster)
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:{}", self.cluster, self.ip, self.port)
    }
}

/// Stable identity of one logical registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationKey {
    pub namespace: String,
    pub group_name: String,
    pub service_name: String,
    pub instance_key: InstanceKey,
}

impl RegistrationKey {
    pub fn new(
        namespace: impl Into<String>,
        group_name: impl Into<String>,
        service_name: impl Into<String>,
        instance_key: InstanceKey,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group_name: group_name.into(),
            service_name: service_name.into(),
            instance_key,
        }
    }

    pub fn instance_key(&self) -> &InstanceKey {
        &self.instance_key
    }
}

/// Composite string form `{namespace}/{group}/{service}/{instance}`.
impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.group_name, self.service_name, self.instance_key
        )
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// Network address and metadata of a registered worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub ip: String,
    pub port: u16,
    /// UDP port as reported by the worker; may be unset (0) or invalid.
    pub udp_port: i32,
    pub cluster: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            udp_port: 0,
            cluster: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_udp_port(mut self, udp_port: i32) -> Self {
        self.udp_port = udp_port;
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Full address string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
