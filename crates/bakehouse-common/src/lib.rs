//! Bakehouse Common - Shared types, traits, and errors
//!
//! This crate provides the foundational types used across all Bakehouse components:
//! - Node identifiers and message directions
//! - Error types
//! - Topology trait consumed by the protocol layer
//! - Common constants

pub mod error;
pub mod traits;

// Re-exports for convenience
pub use error::{BakehouseError, Result};
pub use traits::*;

use serde::{Deserialize, Serialize};

/// Externally assigned process identifier of a group member
pub type NodeId = u64;

/// Default leader id used when none is configured
pub const DEFAULT_LEADER_ID: NodeId = 0;

/// Default number of message handling workers per node
pub const DEFAULT_WORKER_THREADS: usize = 1;

/// Default spin pause of the lock no-op, in milliseconds
pub const DEFAULT_NO_OP_DURATION_MS: u64 = 1000;

/// Logical side of a node's local stack a message arrived from or departs to.
///
/// Replies leave in the direction the request came from; freshly originated
/// messages use [`Direction::Down`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    None,
    Up,
    #[default]
    Down,
    Peer,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::None => "NONE",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Peer => "PEER",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Direction::None),
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "PEER" => Ok(Direction::Peer),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// Format the interface id of the link between two adjacent nodes
pub fn interface_id(from: NodeId, next_hop: NodeId) -> String {
    format!("{}-{}", from, next_hop)
}
