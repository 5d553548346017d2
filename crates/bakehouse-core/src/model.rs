//! Protocol message model
//!
//! Three message kinds travel between nodes: a request to enter the critical
//! section, the leader's permission, and the notification of leaving. Every
//! message carries a routing header that relays rewrite hop by hop.

use bakehouse_common::{BakehouseError, NodeId, Result, interface_id};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Requester asks the leader for the critical section
    EnterRequest,
    /// Leader grants the critical section to the requester
    EnterPermission,
    /// Requester tells the leader it left the critical section
    LeaveNotification,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::EnterRequest => "ENTER_REQUEST",
            MessageKind::EnterPermission => "ENTER_PERMISSION",
            MessageKind::LeaveNotification => "LEAVE_NOTIFICATION",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Routing header of a protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub kind: MessageKind,
    /// Originating node
    pub from: NodeId,
    /// Final destination
    pub to: NodeId,
    /// Node expected to handle or relay the message next
    pub next_hop: NodeId,
    /// Link the message travels on, `"{current}-{next_hop}"`
    pub interface_id: String,
    /// Per-originator sequence number
    pub sequence_id: u64,
}

impl MessageHeader {
    pub fn new(
        kind: MessageKind,
        from: NodeId,
        to: NodeId,
        next_hop: NodeId,
        sequence_id: u64,
    ) -> Self {
        Self {
            kind,
            from,
            to,
            next_hop,
            interface_id: interface_id(from, next_hop),
            sequence_id,
        }
    }

    /// Point the header at the next hop as seen from `current`.
    ///
    /// Only `next_hop` and `interface_id` change.
    pub fn reroute(&mut self, current: NodeId, next_hop: NodeId) {
        self.next_hop = next_hop;
        self.interface_id = interface_id(current, next_hop);
    }
}

/// Protocol message: routing header plus an opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionMessage {
    pub header: MessageHeader,
    #[serde(default)]
    pub payload: Option<Bytes>,
}

impl ExclusionMessage {
    pub fn new(header: MessageHeader, payload: Option<Bytes>) -> Self {
        Self { header, payload }
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    /// Encode into the JSON wire frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BakehouseError::CodecError(e.to_string()))
    }

    /// Decode a JSON wire frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame).map_err(|e| BakehouseError::CodecError(e.to_string()))
    }
}
