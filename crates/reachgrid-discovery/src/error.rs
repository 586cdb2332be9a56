//! Discovery error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from a single provider fetch. None of them are fatal; the
/// reader logs them and tries again on the next tick.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    #[error("unsupported provider scheme: {0}")]
    UnsupportedScheme(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider fetch timed out after {0:?}")]
    Timeout(Duration),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
