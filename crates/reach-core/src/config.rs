//! reachd.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::RequestSchema;
use crate::types::RequestChannel;

/// Default interval between provider reads.
pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for a single provider fetch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachConfig {
    pub node: NodeConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Id of this cluster member, assigned by the membership layer.
    pub member_id: i64,
}

/// Settings for the outbound request client and its address discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Statically configured member addresses.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Endpoint returning a newline-delimited member list.
    pub servers_provider_url: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: RequestChannel,
    #[serde(default)]
    pub tls_enabled: bool,
    /// Provider read interval (e.g., "30s").
    pub read_interval: Option<String>,
    /// Per-fetch timeout (e.g., "10s", "500ms").
    pub request_timeout: Option<String>,
}

fn default_channel() -> RequestChannel {
    RequestChannel::Grpc
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            servers_provider_url: None,
            channel: default_channel(),
            tls_enabled: false,
            read_interval: None,
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// The provider URL, if one is configured and not blank.
    pub fn provider_url(&self) -> Option<&str> {
        self.servers_provider_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn schema(&self) -> RequestSchema {
        RequestSchema::find_by_channel(self.channel, self.tls_enabled)
    }

    pub fn read_interval(&self) -> Duration {
        self.read_interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_READ_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl ReachConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReachConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// Zero, overflowing, and malformed values are `None`, so callers fall
/// back to their default.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let duration = if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }?;
    (!duration.is_zero()).then_some(duration)
}
