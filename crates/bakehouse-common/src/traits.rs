//! Collaborator traits
//!
//! These traits abstract away the routed network the protocol runs on, so the
//! protocol crate depends only on the routing decisions it needs.

use crate::NodeId;

/// Group membership and hop-by-hop routing.
///
/// Implementations are read-only from the protocol's point of view.
pub trait Topology: Send + Sync {
    /// All node ids in the group
    fn node_ids(&self) -> Vec<NodeId>;

    /// Next hop on the path from `from` to `to`, `None` when unreachable.
    ///
    /// `next_hop(a, a)` is `Some(a)`.
    fn next_hop(&self, from: NodeId, to: NodeId) -> Option<NodeId>;

    /// Whether `node` is a member of the group
    fn contains(&self, node: NodeId) -> bool {
        self.node_ids().contains(&node)
    }

    /// Every member except `node`
    fn other_node_ids(&self, node: NodeId) -> Vec<NodeId> {
        self.node_ids().into_iter().filter(|id| *id != node).collect()
    }
}
