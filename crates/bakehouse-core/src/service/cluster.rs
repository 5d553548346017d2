//! In-process cluster runtime
//!
//! Hosts one [`ExclusionComponent`] per topology node. Every node owns an inbox
//! and a configurable number of named worker threads draining it; with a single
//! worker, messages at a node are handled strictly one at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bakehouse_common::{
    BakehouseError, DEFAULT_LEADER_ID, DEFAULT_WORKER_THREADS, NodeId, Result, Topology,
};
use bakehouse_consistency::{FixedDelay, LockAlgorithm, SpinWait};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

use super::exclusion::{ExclusionComponent, ExclusionStats};
use super::transport::{ChannelTransport, Inbound};
use crate::config::Configuration;
use crate::model::ExclusionMessage;

/// Builder for a [`LocalCluster`]
pub struct ClusterBuilder {
    topology: Arc<dyn Topology>,
    leader_id: NodeId,
    worker_threads: usize,
    worker_overrides: HashMap<NodeId, usize>,
    algorithm: LockAlgorithm,
    spin: Arc<dyn SpinWait>,
}

impl ClusterBuilder {
    pub fn new(topology: impl Topology + 'static) -> Self {
        Self::with_topology(Arc::new(topology))
    }

    pub fn with_topology(topology: Arc<dyn Topology>) -> Self {
        Self {
            topology,
            leader_id: DEFAULT_LEADER_ID,
            worker_threads: DEFAULT_WORKER_THREADS,
            worker_overrides: HashMap::new(),
            algorithm: LockAlgorithm::default(),
            spin: Arc::new(FixedDelay::default()),
        }
    }

    /// Build topology, leader, lock and worker settings from configuration
    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let topology = configuration
            .topology_kind()?
            .build(configuration.topology_nodes()?)?;

        Ok(Self::new(topology)
            .leader(configuration.leader_id()?)
            .worker_threads(configuration.worker_threads()?)
            .algorithm(configuration.lock_algorithm()?)
            .spin(Arc::new(FixedDelay::new(configuration.no_op_duration()?))))
    }

    pub fn leader(mut self, leader_id: NodeId) -> Self {
        self.leader_id = leader_id;
        self
    }

    /// Workers per node
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    /// Workers for one specific node
    pub fn node_worker_threads(mut self, node: NodeId, workers: usize) -> Self {
        self.worker_overrides.insert(node, workers);
        self
    }

    pub fn algorithm(mut self, algorithm: LockAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn spin(mut self, spin: Arc<dyn SpinWait>) -> Self {
        self.spin = spin;
        self
    }

    pub fn build(self) -> Result<LocalCluster> {
        let node_ids = self.topology.node_ids();
        if !self.topology.contains(self.leader_id) {
            return Err(BakehouseError::NodeNotExist(self.leader_id));
        }
        if self.worker_threads == 0 || self.worker_overrides.values().any(|w| *w == 0) {
            return Err(BakehouseError::IllegalArgument(
                "worker threads must be at least 1".to_string(),
            ));
        }

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for id in &node_ids {
            let (tx, rx) = unbounded_channel();
            senders.insert(*id, tx);
            receivers.insert(*id, rx);
        }

        let transport = Arc::new(ChannelTransport::new(senders.clone()));
        let mut nodes = BTreeMap::new();
        let mut workers = HashMap::new();
        for id in node_ids {
            let component = ExclusionComponent::new(id, self.topology.clone(), transport.clone())
                .with_algorithm(self.algorithm)
                .with_spin(self.spin.clone());
            component.set_leader(self.leader_id);
            nodes.insert(id, Arc::new(component));
            workers.insert(
                id,
                self.worker_overrides
                    .get(&id)
                    .copied()
                    .unwrap_or(self.worker_threads),
            );
        }

        Ok(LocalCluster {
            leader_id: self.leader_id,
            nodes,
            senders,
            receivers,
            workers,
            handles: Vec::new(),
        })
    }
}

/// Running group of exclusion components connected by channels
pub struct LocalCluster {
    leader_id: NodeId,
    nodes: BTreeMap<NodeId, Arc<ExclusionComponent>>,
    senders: HashMap<NodeId, UnboundedSender<Inbound>>,
    /// Taken when the workers start
    receivers: HashMap<NodeId, UnboundedReceiver<Inbound>>,
    workers: HashMap<NodeId, usize>,
    handles: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    pub fn leader_id(&self) -> NodeId {
        self.leader_id
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<ExclusionComponent>> {
        self.nodes.get(&id).cloned()
    }

    pub fn leader(&self) -> Option<Arc<ExclusionComponent>> {
        self.node(self.leader_id)
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Set the same callback on every node
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&ExclusionComponent) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        for node in self.nodes.values() {
            let callback = callback.clone();
            node.set_callback(move |component| callback(component));
        }
    }

    /// Initialize every node, then start its workers
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(BakehouseError::RuntimeError(
                "cluster already started".to_string(),
            ));
        }

        for node in self.nodes.values() {
            node.initialize();
        }

        for (id, node) in &self.nodes {
            let receiver = self
                .receivers
                .remove(id)
                .ok_or(BakehouseError::InboxClosed(*id))?;
            let inbox = Arc::new(Mutex::new(receiver));
            let count = self.workers.get(id).copied().unwrap_or(DEFAULT_WORKER_THREADS);

            for worker in 0..count {
                let inbox = inbox.clone();
                let node = node.clone();
                let handle = std::thread::Builder::new()
                    .name(format!("bakehouse-node-{}-{}", id, worker))
                    .spawn(move || run_worker(node, inbox))?;
                self.handles.push(handle);
            }
        }

        info!(
            nodes = self.nodes.len(),
            leader = self.leader_id,
            workers = self.handles.len(),
            "Local cluster started"
        );
        Ok(())
    }

    /// Stop all workers and wait for them.
    ///
    /// A worker blocked inside the lock's `enter` never returns, so callers must
    /// only shut down a quiescent cluster.
    pub fn shutdown(&mut self) -> Result<()> {
        self.send_stops();
        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        info!(nodes = self.nodes.len(), "Local cluster stopped");

        if panicked > 0 {
            return Err(BakehouseError::RuntimeError(format!(
                "{} worker(s) panicked",
                panicked
            )));
        }
        Ok(())
    }

    /// Poll `condition` until it holds or `timeout` elapses
    pub fn wait_until<F>(&self, timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut(&LocalCluster) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Protocol counters of every node
    pub fn stats(&self) -> BTreeMap<NodeId, ExclusionStats> {
        self.nodes
            .iter()
            .map(|(id, node)| (*id, node.stats()))
            .collect()
    }

    fn send_stops(&self) {
        if !self.is_running() {
            return;
        }
        for (id, sender) in &self.senders {
            let count = self.workers.get(id).copied().unwrap_or(DEFAULT_WORKER_THREADS);
            for _ in 0..count {
                if sender.send(Inbound::Stop).is_err() {
                    debug!(node = id, "Inbox already closed");
                }
            }
        }
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        // Workers are detached here, shutdown() joins them
        self.send_stops();
    }
}

fn run_worker(node: Arc<ExclusionComponent>, inbox: Arc<Mutex<UnboundedReceiver<Inbound>>>) {
    loop {
        let inbound = inbox.lock().blocking_recv();
        match inbound {
            Some(Inbound::Frame { direction, frame }) => match ExclusionMessage::decode(&frame) {
                Ok(message) => node.message_received(direction, message),
                Err(e) => warn!(node = node.node_id(), error = %e, "Undecodable frame dropped"),
            },
            Some(Inbound::Stop) | None => break,
        }
    }
    debug!(node = node.node_id(), "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::topology::GraphTopology;

    fn zero_spin() -> Arc<dyn SpinWait> {
        Arc::new(FixedDelay::from_millis(0))
    }

    #[test]
    fn test_build_rejects_unknown_leader() {
        let result = ClusterBuilder::new(GraphTopology::complete(3).unwrap())
            .leader(9)
            .build();
        assert!(matches!(result, Err(BakehouseError::NodeNotExist(9))));
    }

    #[test]
    fn test_build_rejects_zero_workers() {
        let result = ClusterBuilder::new(GraphTopology::complete(3).unwrap())
            .node_worker_threads(1, 0)
            .build();
        assert!(matches!(result, Err(BakehouseError::IllegalArgument(_))));
    }

    #[test]
    fn test_from_configuration_rejects_zero_workers() {
        let config = ::config::Config::builder()
            .set_override(crate::config::WORKER_THREADS_PROPERTY, 0)
            .unwrap()
            .set_override(crate::config::TOPOLOGY_NODES_PROPERTY, 3)
            .unwrap()
            .build()
            .unwrap();
        let configuration = Configuration::from_config(config);

        let result = ClusterBuilder::from_configuration(&configuration).unwrap().build();
        assert!(matches!(result, Err(BakehouseError::IllegalArgument(_))));
    }

    #[test]
    fn test_from_configuration_rejects_negative_leader() {
        let config = ::config::Config::builder()
            .set_override(crate::config::LEADER_ID_PROPERTY, -1)
            .unwrap()
            .build()
            .unwrap();
        let configuration = Configuration::from_config(config);

        assert!(matches!(
            ClusterBuilder::from_configuration(&configuration),
            Err(BakehouseError::ConfigError(_))
        ));
    }

    #[test]
    fn test_leader_set_on_every_node() {
        let cluster = ClusterBuilder::new(GraphTopology::ring(4).unwrap())
            .leader(2)
            .spin(zero_spin())
            .build()
            .unwrap();

        assert_eq!(cluster.node_ids(), vec![0, 1, 2, 3]);
        for id in cluster.node_ids() {
            assert_eq!(cluster.node(id).unwrap().leader_id(), 2);
        }
        assert!(cluster.leader().unwrap().is_leader());
        assert!(!cluster.is_running());
    }

    #[test]
    fn test_start_twice_fails() {
        let mut cluster = ClusterBuilder::new(GraphTopology::complete(2).unwrap())
            .spin(zero_spin())
            .build()
            .unwrap();
        cluster.start().unwrap();
        assert!(cluster.start().is_err());
        cluster.shutdown().unwrap();
    }

    #[test]
    fn test_start_initializes_leader_lock() {
        let mut cluster = ClusterBuilder::new(GraphTopology::star(5).unwrap())
            .spin(zero_spin())
            .build()
            .unwrap();
        cluster.start().unwrap();

        let lock = cluster.leader().unwrap().lock().unwrap();
        assert_eq!(lock.capacity(), 5);
        assert!(cluster.node(3).unwrap().lock().is_none());
        cluster.shutdown().unwrap();
    }

    #[test]
    fn test_wait_until_times_out() {
        let cluster = ClusterBuilder::new(GraphTopology::complete(2).unwrap())
            .build()
            .unwrap();
        assert!(!cluster.wait_until(Duration::from_millis(10), |_| false));
        assert!(cluster.wait_until(Duration::from_millis(10), |_| true));
    }
}
