// Graph topology with shortest-path routing
// Next hops are precomputed once with a breadth-first search from every node

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use bakehouse_common::{BakehouseError, NodeId, Result, Topology};
use serde::{Deserialize, Serialize};

/// Shape of a generated topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Every node linked to every other node
    #[default]
    Complete,
    /// Node `i` linked to `i + 1`, last linked back to first
    Ring,
    /// Node `i` linked to `i + 1`
    Line,
    /// Node 0 linked to every other node
    Star,
}

impl TopologyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TopologyKind::Complete => "complete",
            TopologyKind::Ring => "ring",
            TopologyKind::Line => "line",
            TopologyKind::Star => "star",
        }
    }

    /// Build a topology of this shape over node ids `0..nodes`
    pub fn build(self, nodes: u64) -> Result<GraphTopology> {
        match self {
            TopologyKind::Complete => GraphTopology::complete(nodes),
            TopologyKind::Ring => GraphTopology::ring(nodes),
            TopologyKind::Line => GraphTopology::line(nodes),
            TopologyKind::Star => GraphTopology::star(nodes),
        }
    }
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TopologyKind {
    type Err = BakehouseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(TopologyKind::Complete),
            "ring" => Ok(TopologyKind::Ring),
            "line" => Ok(TopologyKind::Line),
            "star" => Ok(TopologyKind::Star),
            _ => Err(BakehouseError::TopologyError(format!(
                "unknown topology kind: {}",
                s
            ))),
        }
    }
}

/// Undirected graph of nodes with a precomputed next-hop table
#[derive(Debug, Clone)]
pub struct GraphTopology {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// (from, to) -> first hop on a shortest path
    routes: HashMap<(NodeId, NodeId), NodeId>,
}

impl GraphTopology {
    /// Build from an explicit node set and edge list.
    ///
    /// Self loops are ignored; edges naming unknown nodes are rejected.
    pub fn from_edges(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self> {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> =
            nodes.into_iter().map(|id| (id, BTreeSet::new())).collect();

        if adjacency.is_empty() {
            return Err(BakehouseError::TopologyError(
                "topology has no nodes".to_string(),
            ));
        }

        for (a, b) in edges {
            if !adjacency.contains_key(&a) {
                return Err(BakehouseError::NodeNotExist(a));
            }
            if !adjacency.contains_key(&b) {
                return Err(BakehouseError::NodeNotExist(b));
            }
            if a == b {
                continue;
            }
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }

        let routes = Self::compute_routes(&adjacency);
        Ok(Self { adjacency, routes })
    }

    pub fn complete(nodes: u64) -> Result<Self> {
        let edges = (0..nodes).flat_map(|a| ((a + 1)..nodes).map(move |b| (a, b)));
        Self::from_edges(0..nodes, edges)
    }

    pub fn ring(nodes: u64) -> Result<Self> {
        let edges = (0..nodes).map(|a| (a, (a + 1) % nodes.max(1)));
        Self::from_edges(0..nodes, edges)
    }

    pub fn line(nodes: u64) -> Result<Self> {
        let edges = (1..nodes).map(|b| (b - 1, b));
        Self::from_edges(0..nodes, edges)
    }

    pub fn star(nodes: u64) -> Result<Self> {
        let edges = (1..nodes).map(|b| (0, b));
        Self::from_edges(0..nodes, edges)
    }

    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.adjacency
            .get(&node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    fn compute_routes(
        adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    ) -> HashMap<(NodeId, NodeId), NodeId> {
        let mut routes = HashMap::new();

        for &source in adjacency.keys() {
            let mut first_hops: HashMap<NodeId, NodeId> = HashMap::new();
            let mut queue = VecDeque::new();
            first_hops.insert(source, source);
            queue.push_back(source);

            while let Some(current) = queue.pop_front() {
                let via = first_hops[&current];
                for &neighbor in &adjacency[&current] {
                    if first_hops.contains_key(&neighbor) {
                        continue;
                    }
                    let hop = if current == source { neighbor } else { via };
                    first_hops.insert(neighbor, hop);
                    queue.push_back(neighbor);
                }
            }

            for (target, hop) in first_hops {
                routes.insert((source, target), hop);
            }
        }

        routes
    }
}

impl Topology for GraphTopology {
    fn node_ids(&self) -> Vec<NodeId> {
        self.adjacency.keys().copied().collect()
    }

    fn next_hop(&self, from: NodeId, to: NodeId) -> Option<NodeId> {
        self.routes.get(&(from, to)).copied()
    }

    fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }
}
