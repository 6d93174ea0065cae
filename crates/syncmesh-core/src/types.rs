//! Protocol types for the syncmesh peer protocol
//!
//! All inter-node traffic is a single [`Message`] envelope encoded as
//! JSON. Field names on the wire (and in the persisted route table) are
//! fixed by the protocol and pinned with serde renames; do not let them
//! drift with the Rust names.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in unix milliseconds.
pub fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A peer record in the route table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteItem {
    /// Stable unique peer identifier
    #[serde(rename = "PeerID")]
    pub peer_id: String,
    /// Cluster/shard the peer belongs to
    #[serde(rename = "GroupID")]
    pub group_id: String,
    /// Host the peer is reachable on
    #[serde(rename = "PeerAddr")]
    pub peer_addr: String,
    /// Port of the peer's file-sync service
    #[serde(rename = "PeerPort")]
    pub peer_port: u16,
    /// Port of the peer's membership daemon (this protocol)
    #[serde(rename = "NodePort")]
    pub node_port: u16,
    /// Last heartbeat arrival, unix millis; 0 = never seen.
    /// A sender leaves this unset on its own heartbeat; the receiver
    /// stamps it.
    #[serde(rename = "FlashTime", default)]
    pub flash_time: u64,
}

impl RouteItem {
    /// Address of the peer's file-sync service.
    pub fn peer_endpoint(&self) -> String {
        format!("{}:{}", self.peer_addr, self.peer_port)
    }

    /// Address of the peer's membership daemon.
    pub fn node_endpoint(&self) -> String {
        format!("{}:{}", self.peer_addr, self.node_port)
    }

    /// Stamp the last-seen time with now.
    pub fn touch(&mut self) {
        self.flash_time = unix_millis();
    }

    /// A heartbeat must carry enough to dial the peer back.
    pub fn check_announce(&self) -> Result<()> {
        if self.peer_id.is_empty() {
            return Err(Error::MissingField("PeerID"));
        }
        if self.peer_addr.is_empty() {
            return Err(Error::MissingField("PeerAddr"));
        }
        if self.peer_port == 0 {
            return Err(Error::MissingField("PeerPort"));
        }
        Ok(())
    }
}

/// Payload variants, tagged on the wire by `Type` with the body under
/// `Data`. A payload whose shape does not match its tag fails the
/// decode; nothing downstream ever sees an untyped value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "Type", content = "Data")]
pub enum Payload {
    /// The sender's own identity, re-announced periodically
    #[serde(rename = "heartbeat")]
    Heartbeat(RouteItem),
    /// A route table snapshot (gossip push or discovery response)
    #[serde(rename = "data")]
    Data(Vec<RouteItem>),
    /// Discovery: the callback address the full table should be sent to
    #[serde(rename = "request")]
    Request(String),
}

/// The wire envelope.
///
/// `sign` is reserved for message authentication and is never populated
/// by this implementation; it round-trips when present so traffic from
/// a future signing version is not rejected outright.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(rename = "Sign", default, skip_serializing_if = "Vec::is_empty")]
    pub sign: Vec<u8>,
}

impl Message {
    /// Heartbeat envelope announcing `item`.
    pub fn heartbeat(item: RouteItem) -> Self {
        Self {
            payload: Payload::Heartbeat(item),
            sign: Vec::new(),
        }
    }

    /// Table-snapshot envelope.
    pub fn data(items: Vec<RouteItem>) -> Self {
        Self {
            payload: Payload::Data(items),
            sign: Vec::new(),
        }
    }

    /// Discovery request asking for the full table at `callback`.
    pub fn request(callback: impl Into<String>) -> Self {
        Self {
            payload: Payload::Request(callback.into()),
            sign: Vec::new(),
        }
    }

    /// Encode the envelope as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope from JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
