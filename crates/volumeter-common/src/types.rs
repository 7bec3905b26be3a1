//! Domain primitive types used across the Volumeter workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol families tracked by the aggregation engine.
///
/// Anything else observed on the event stream is recognized but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Internet Control Message Protocol (tracked under a sentinel port).
    Icmp,
}

impl Protocol {
    /// Maps a conntrack protocol token to a tracked protocol.
    ///
    /// Returns `None` for protocol families the engine does not track.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "icmp" => Some(Self::Icmp),
            _ => None,
        }
    }

    /// Returns the lowercase wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle classification of a connection-tracking event.
///
/// Only destroy events carry accounted volumes; every non-destroy event
/// (`NEW`, `UPDATE`, ...) is an in-progress connection and contributes one
/// provisional packet to the estimate buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Connection still in progress; no final counters yet.
    Active,
    /// Terminal event carrying the final accounted volume.
    Destroy {
        /// Total packets for the connection (both directions when replied).
        packets: u64,
        /// Total bytes for the connection (both directions when replied).
        bytes: u64,
    },
}

/// A parsed connection-tracking event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Timestamp segment of the source line, passed through opaquely.
    pub timestamp: String,
    /// Lifecycle classification, with final volumes for destroy events.
    pub kind: EventKind,
    /// Transport protocol of the connection.
    pub protocol: Protocol,
    /// Destination address of the forward direction.
    pub dst_addr: String,
    /// Destination port of the forward direction (sentinel 0 for ICMP).
    pub dst_port: u16,
    /// Whether the connection saw a reply; unreplied destroy lines carry
    /// forward-direction counters only.
    pub replied: bool,
}

impl Event {
    /// Returns the aggregation key this event accumulates under.
    #[must_use]
    pub const fn key(&self) -> PortKey {
        PortKey {
            protocol: self.protocol,
            port: self.dst_port,
        }
    }
}

/// Aggregation key: one counter exists per protocol/port pair observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortKey {
    /// Transport protocol.
    pub protocol: Protocol,
    /// Destination port (sentinel 0 for ICMP).
    pub port: u16,
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Accumulated volume for a single protocol/port pair.
///
/// `buffer` is a provisional estimate for connections still in progress
/// (one active event ≈ one packet in flight). It is advisory only and is
/// never folded into the cumulative totals; a destroy event replaces the
/// estimate with real counters and zeroes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortVolume {
    /// Cumulative packet total from destroyed connections.
    pub packets: u64,
    /// Cumulative byte total from destroyed connections.
    pub bytes: u64,
    /// Provisional packet estimate for connections not yet destroyed.
    pub buffer: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_from_token_recognizes_tracked_families() {
        assert_eq!(Protocol::from_token("tcp"), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_token("udp"), Some(Protocol::Udp));
        assert_eq!(Protocol::from_token("icmp"), Some(Protocol::Icmp));
    }

    #[test]
    fn protocol_from_token_rejects_untracked_families() {
        assert_eq!(Protocol::from_token("gre"), None);
        assert_eq!(Protocol::from_token("sctp"), None);
        assert_eq!(Protocol::from_token(""), None);
    }

    #[test]
    fn port_key_displays_port_and_protocol() {
        let key = PortKey {
            protocol: Protocol::Tcp,
            port: 443,
        };
        assert_eq!(key.to_string(), "443/tcp");
    }
}
