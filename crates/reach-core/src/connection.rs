//! Connection-id wire format.
//!
//! A connection id names the cluster member and local slot that own the
//! live channel to an instance: `{member_id}_{local_sequence}`. The
//! member segment is a signed 64-bit integer; the rest is opaque.
//!
//! Parsing never fails. Anything that does not carry a numeric member
//! segment resolves to [`UNKNOWN_MEMBER`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner id reported when the owning member cannot be determined.
pub const UNKNOWN_MEMBER: i64 = -1;

/// Separator between the member segment and the local sequence.
pub const SEPARATOR: char = '_';

/// A connection id as received from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the id a member assigns to one of its local connections.
    pub fn for_member(member_id: i64, local: impl fmt::Display) -> Self {
        Self(format!("{member_id}{SEPARATOR}{local}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Id of the member owning this connection, or [`UNKNOWN_MEMBER`].
    pub fn owner(&self) -> i64 {
        owner_of(&self.0)
    }

    /// Whether `member_id` owns this connection.
    pub fn is_owned_by(&self, member_id: i64) -> bool {
        is_owned_by(&self.0, member_id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ConnectionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Parse the member segment of a raw connection id.
pub fn owner_of(raw: &str) -> i64 {
    if raw.is_empty() {
        return UNKNOWN_MEMBER;
    }
    let head = raw.split_once(SEPARATOR).map_or(raw, |(head, _)| head);
    head.parse::<i64>().unwrap_or(UNKNOWN_MEMBER)
}

/// Whether a raw connection id starts with `{member_id}_`.
pub fn is_owned_by(raw: &str, member_id: i64) -> bool {
    raw.strip_prefix(member_id.to_string().as_str())
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_parses_member_segment() {
        assert_eq!(owner_of("7_3"), 7);
        assert_eq!(owner_of("1024_abc_def"), 1024);
        assert_eq!(owner_of("-5_1"), -5);
    }

    #[test]
    fn owner_without_separator_uses_whole_id() {
        assert_eq!(owner_of("42"), 42);
    }

    #[test]
    fn owner_degrades_to_unknown() {
        assert_eq!(owner_of(""), UNKNOWN_MEMBER);
        assert_eq!(owner_of("abc_1"), UNKNOWN_MEMBER);
        assert_eq!(owner_of("_1"), UNKNOWN_MEMBER);
        assert_eq!(owner_of("99999999999999999999_1"), UNKNOWN_MEMBER);
    }

    #[test]
    fn ownership_requires_separator() {
        assert!(is_owned_by("7_99", 7));
        assert!(!is_owned_by("77_99", 7));
        assert!(!is_owned_by("7", 7));
        assert!(!is_owned_by("", 7));
        assert!(!is_owned_by("8_1", 7));
    }

    #[test]
    fn for_member_round_trips_owner() {
        let id = ConnectionId::for_member(12, "conn-5");
        assert_eq!(id.as_str(), "12_conn-5");
        assert_eq!(id.owner(), 12);
        assert!(id.is_owned_by(12));
    }
}
