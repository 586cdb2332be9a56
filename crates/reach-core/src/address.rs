//! Server address resolution.
//!
//! Cluster member addresses come from static config and from a provider
//! endpoint as bare `host:port` strings or full URIs. A [`RequestSchema`]
//! derived from the client's channel and TLS setting supplies the scheme
//! for bare entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RequestChannel;

/// URI scheme used to reach cluster members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSchema {
    Http,
    Https,
    Grpc,
    Grpcs,
}

impl RequestSchema {
    /// Resolve the schema for a request channel.
    pub fn find_by_channel(channel: RequestChannel, tls_enabled: bool) -> Self {
        match (channel, tls_enabled) {
            (RequestChannel::Http, false) => RequestSchema::Http,
            (RequestChannel::Http, true) => RequestSchema::Https,
            (RequestChannel::Grpc, false) => RequestSchema::Grpc,
            (RequestChannel::Grpc, true) => RequestSchema::Grpcs,
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(RequestSchema::Http),
            "https" => Some(RequestSchema::Https),
            "grpc" => Some(RequestSchema::Grpc),
            "grpcs" => Some(RequestSchema::Grpcs),
            _ => None,
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            RequestSchema::Http => "http",
            RequestSchema::Https => "https",
            RequestSchema::Grpc => "grpc",
            RequestSchema::Grpcs => "grpcs",
        }
    }

    /// Scheme prefix including the `://` marker.
    pub fn prefix(self) -> String {
        format!("{}://", self.scheme())
    }

    /// Port assumed when an address omits one. gRPC addresses must be explicit.
    pub fn default_port(self) -> Option<u16> {
        match self {
            RequestSchema::Http => Some(80),
            RequestSchema::Https => Some(443),
            RequestSchema::Grpc | RequestSchema::Grpcs => None,
        }
    }
}

/// A resolved cluster member address.
///
/// Ordering is by host, then port, so sorted lists are stable across
/// fetches regardless of the order the provider returned them in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub schema: RequestSchema,
}

impl ServerAddress {
    /// Parse one address entry, falling back to `schema` when the entry
    /// carries no scheme of its own.
    ///
    /// Returns `None` for blank lines and anything that does not resolve
    /// to a host and port.
    pub fn parse(entry: &str, schema: RequestSchema) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        let candidate = if entry.contains("://") {
            entry.to_string()
        } else {
            format!("{}{entry}", schema.prefix())
        };

        let uri: http::Uri = candidate.parse().ok()?;
        let schema = RequestSchema::from_scheme(uri.scheme_str()?)?;
        let host = uri.host()?;
        if host.is_empty() {
            return None;
        }
        let port = uri.port_u16().or_else(|| schema.default_port())?;

        Some(Self {
            host: host.to_string(),
            port,
            schema,
        })
    }

    /// `host:port` without a scheme.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.schema.scheme(), self.host, self.port)
    }
}

/// Parse a batch of entries, dropping the ones that do not resolve.
/// The result is sorted and free of duplicates.
pub fn parse_addresses<I, S>(entries: I, schema: RequestSchema) -> Vec<ServerAddress>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut addresses: Vec<ServerAddress> = entries
        .into_iter()
        .filter_map(|entry| ServerAddress::parse(entry.as_ref(), schema))
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}
