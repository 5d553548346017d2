//! Mutual exclusion service component
//!
//! One component runs on every node of the group. Any node can ask for the
//! critical section; only the leader owns the lock and decides who enters.
//! Messages not addressed to the node are relayed one hop closer to their
//! destination when the node is the designated next hop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bakehouse_common::{DEFAULT_LEADER_ID, Direction, NodeId, Topology};
use bakehouse_consistency::{ExclusionLock, FixedDelay, LockAlgorithm, SpinWait};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::transport::Transport;
use crate::metrics::{MESSAGES_DROPPED_TOTAL, MESSAGES_RELAYED_TOTAL, PERMISSIONS_GRANTED_TOTAL};
use crate::model::{ExclusionMessage, MessageHeader, MessageKind};

/// Action run once the node is inside the critical section.
///
/// The callback is responsible for calling
/// [`ExclusionComponent::exit_critical_section`] when done.
pub type CriticalSectionCallback = Arc<dyn Fn(&ExclusionComponent) + Send + Sync>;

/// Snapshot of a component's protocol counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionStats {
    /// Enter requests originated by this node
    pub requests_sent: u64,
    /// Leave notifications originated by this node
    pub notifications_sent: u64,
    /// Permissions granted (leader only)
    pub permissions_granted: u64,
    /// Permissions received from the leader
    pub permissions_received: u64,
    /// Leave notifications applied (leader only)
    pub notifications_handled: u64,
    /// Messages forwarded for other nodes
    pub messages_relayed: u64,
    /// Messages dropped for lack of a route or a lock
    pub messages_dropped: u64,
}

#[derive(Default)]
struct ExclusionStatsCollector {
    requests_sent: AtomicU64,
    notifications_sent: AtomicU64,
    permissions_granted: AtomicU64,
    permissions_received: AtomicU64,
    notifications_handled: AtomicU64,
    messages_relayed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ExclusionStatsCollector {
    fn snapshot(&self) -> ExclusionStats {
        ExclusionStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            permissions_granted: self.permissions_granted.load(Ordering::Relaxed),
            permissions_received: self.permissions_received.load(Ordering::Relaxed),
            notifications_handled: self.notifications_handled.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Per-node mutual exclusion protocol component
pub struct ExclusionComponent {
    node_id: NodeId,
    leader_id: AtomicU64,
    topology: Arc<dyn Topology>,
    transport: Arc<dyn Transport>,
    algorithm: LockAlgorithm,
    spin: Arc<dyn SpinWait>,
    callback: RwLock<Option<CriticalSectionCallback>>,
    other_node_ids: RwLock<Vec<NodeId>>,
    /// Present on the leader after initialization
    lock: RwLock<Option<Arc<dyn ExclusionLock>>>,
    sequence: AtomicU64,
    stats: ExclusionStatsCollector,
}

impl ExclusionComponent {
    pub fn new(
        node_id: NodeId,
        topology: Arc<dyn Topology>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            node_id,
            leader_id: AtomicU64::new(DEFAULT_LEADER_ID),
            topology,
            transport,
            algorithm: LockAlgorithm::default(),
            spin: Arc::new(FixedDelay::default()),
            callback: RwLock::new(None),
            other_node_ids: RwLock::new(Vec::new()),
            lock: RwLock::new(None),
            sequence: AtomicU64::new(0),
            stats: ExclusionStatsCollector::default(),
        }
    }

    /// Lock strategy the leader instantiates
    pub fn with_algorithm(mut self, algorithm: LockAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Spin primitive handed to the leader's lock
    pub fn with_spin(mut self, spin: Arc<dyn SpinWait>) -> Self {
        self.spin = spin;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn leader_id(&self) -> NodeId {
        self.leader_id.load(Ordering::SeqCst)
    }

    pub fn is_leader(&self) -> bool {
        self.leader_id() == self.node_id
    }

    /// Set the group leader; must be identical on every node and happen before
    /// [`initialize`](Self::initialize).
    pub fn set_leader(&self, leader_id: NodeId) {
        self.leader_id.store(leader_id, Ordering::SeqCst);
    }

    /// Set the action performed inside the critical section
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&ExclusionComponent) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Remove the callback; permissions are then answered by leaving immediately
    pub fn clear_callback(&self) {
        *self.callback.write() = None;
    }

    /// Collect the group and, on the leader, build the lock.
    ///
    /// Members are registered in ascending pid order, so the smallest pid gets
    /// slot index 0. Once the leader holds a lock, later calls keep it and its
    /// tickets.
    pub fn initialize(&self) {
        let others = self.topology.other_node_ids(self.node_id);
        *self.other_node_ids.write() = others.clone();

        if self.lock.read().is_some() {
            debug!(node = self.node_id, "Leader lock already initialized");
            return;
        }

        if !self.is_leader() {
            debug!(
                node = self.node_id,
                leader = self.leader_id(),
                peers = others.len(),
                "Exclusion component initialized"
            );
            return;
        }

        let lock = self.algorithm.build(others.len() + 1, self.spin.clone());
        let mut members = others;
        members.push(self.node_id);
        members.sort_unstable();
        for pid in &members {
            if lock.add_process(*pid).is_none() {
                warn!(node = self.node_id, pid, "No free lock slot for group member");
            }
        }
        *self.lock.write() = Some(lock);

        info!(
            node = self.node_id,
            algorithm = %self.algorithm,
            members = members.len(),
            "Leader lock initialized"
        );
    }

    /// Ask the leader for the critical section
    pub fn enter_critical_section(&self) {
        if self.send_message_to(self.leader_id(), MessageKind::EnterRequest, None, Direction::Down) {
            self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Tell the leader this node left the critical section
    pub fn exit_critical_section(&self) {
        if self.send_message_to(
            self.leader_id(),
            MessageKind::LeaveNotification,
            None,
            Direction::Down,
        ) {
            self.stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Peers known since initialization
    pub fn other_node_ids(&self) -> Vec<NodeId> {
        self.other_node_ids.read().clone()
    }

    /// The leader's lock, `None` on other nodes or before initialization
    pub fn lock(&self) -> Option<Arc<dyn ExclusionLock>> {
        self.lock.read().clone()
    }

    pub fn stats(&self) -> ExclusionStats {
        self.stats.snapshot()
    }

    /// Entry point for every message delivered to this node
    pub fn message_received(&self, direction: Direction, message: ExclusionMessage) {
        if message.header.to != self.node_id {
            if message.header.next_hop == self.node_id {
                self.relay_message(direction, message);
            } else {
                trace!(
                    node = self.node_id,
                    next_hop = message.header.next_hop,
                    "Message for another hop ignored"
                );
            }
            return;
        }

        match message.header.kind {
            MessageKind::EnterRequest => self.request_message(direction, &message.header),
            MessageKind::EnterPermission => self.permission_message(&message.header),
            MessageKind::LeaveNotification => self.notification_message(&message.header),
        }
    }

    fn request_message(&self, direction: Direction, header: &MessageHeader) {
        if !self.is_leader() {
            warn!(node = self.node_id, from = header.from, "Enter request reached a non-leader");
            return;
        }
        let Some(lock) = self.lock() else {
            warn!(node = self.node_id, from = header.from, "Leader lock not initialized, dropping request");
            self.record_drop();
            return;
        };

        debug!(from = header.from, sequence_id = header.sequence_id, "Enter request received");
        lock.lock(header.from);
        lock.enter(header.from);

        if self.send_message_to(header.from, MessageKind::EnterPermission, None, direction) {
            self.stats.permissions_granted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(PERMISSIONS_GRANTED_TOTAL).increment(1);
            debug!(to = header.from, ticket = ?lock.ticket(header.from), "Permission granted");
        }
    }

    fn permission_message(&self, header: &MessageHeader) {
        self.stats.permissions_received.fetch_add(1, Ordering::Relaxed);
        debug!(node = self.node_id, from = header.from, "Entered critical section");

        let callback = self.callback.read().clone();
        match callback {
            Some(callback) => callback(self),
            None => self.exit_critical_section(),
        }
    }

    fn notification_message(&self, header: &MessageHeader) {
        if !self.is_leader() {
            warn!(node = self.node_id, from = header.from, "Leave notification reached a non-leader");
            return;
        }
        let Some(lock) = self.lock() else {
            warn!(node = self.node_id, from = header.from, "Leader lock not initialized, dropping notification");
            self.record_drop();
            return;
        };

        lock.unlock(header.from);
        self.stats.notifications_handled.fetch_add(1, Ordering::Relaxed);
        debug!(from = header.from, "Critical section released");
    }

    /// Build and emit a new message; returns whether a route existed
    fn send_message_to(
        &self,
        target: NodeId,
        kind: MessageKind,
        payload: Option<Bytes>,
        direction: Direction,
    ) -> bool {
        let Some(next_hop) = self.topology.next_hop(self.node_id, target) else {
            debug!(node = self.node_id, target, kind = %kind, "Destination unreachable, dropping message");
            self.record_drop();
            return false;
        };

        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst);
        let header = MessageHeader::new(kind, self.node_id, target, next_hop, sequence_id);
        self.send_message(direction, ExclusionMessage::new(header, payload));
        true
    }

    fn send_message(&self, direction: Direction, message: ExclusionMessage) {
        self.transport.send(direction, message);
    }

    fn relay_message(&self, direction: Direction, mut message: ExclusionMessage) {
        let destination = message.header.to;
        match self.topology.next_hop(self.node_id, destination) {
            Some(next_hop) if next_hop != self.node_id => {
                message.header.reroute(self.node_id, next_hop);
                self.stats.messages_relayed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(MESSAGES_RELAYED_TOTAL).increment(1);
                trace!(node = self.node_id, destination, next_hop, kind = %message.kind(), "Relaying message");
                self.send_message(direction, message);
            }
            _ => {
                debug!(node = self.node_id, destination, "No route for relay, dropping message");
                self.record_drop();
            }
        }
    }

    fn record_drop(&self) {
        self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MESSAGES_DROPPED_TOTAL).increment(1);
    }
}

impl std::fmt::Debug for ExclusionComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionComponent")
            .field("node_id", &self.node_id)
            .field("leader_id", &self.leader_id())
            .field("algorithm", &self.algorithm)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::topology::GraphTopology;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Direction, ExclusionMessage)>>,
    }

    impl RecordingTransport {
        fn take(&self) -> Vec<(Direction, ExclusionMessage)> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, direction: Direction, message: ExclusionMessage) {
            self.sent.lock().push((direction, message));
        }
    }

    fn component(
        node_id: NodeId,
        topology: GraphTopology,
    ) -> (ExclusionComponent, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let component = ExclusionComponent::new(node_id, Arc::new(topology), transport.clone())
            .with_spin(Arc::new(FixedDelay::from_millis(0)));
        (component, transport)
    }

    fn message(kind: MessageKind, from: NodeId, to: NodeId, next_hop: NodeId) -> ExclusionMessage {
        ExclusionMessage::new(MessageHeader::new(kind, from, to, next_hop, 0), None)
    }

    #[test]
    fn test_enter_request_addressed_to_leader() {
        let (node, transport) = component(3, GraphTopology::line(5).unwrap());
        node.initialize();
        node.enter_critical_section();

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        let (direction, message) = &sent[0];
        assert_eq!(*direction, Direction::Down);
        assert_eq!(message.kind(), MessageKind::EnterRequest);
        assert_eq!(message.header.from, 3);
        assert_eq!(message.header.to, 0);
        assert_eq!(message.header.next_hop, 2);
        assert_eq!(message.header.interface_id, "3-2");
        assert!(message.payload.is_none());
        assert_eq!(node.stats().requests_sent, 1);
    }

    #[test]
    fn test_sequence_ids_increase() {
        let (node, transport) = component(1, GraphTopology::complete(3).unwrap());
        node.enter_critical_section();
        node.exit_critical_section();

        let ids: Vec<u64> = transport
            .take()
            .into_iter()
            .map(|(_, m)| m.header.sequence_id)
            .collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_leader_builds_lock_in_pid_order() {
        let topology = GraphTopology::from_edges([30, 10, 20], [(10, 20), (20, 30)]).unwrap();
        let (leader, _) = component(20, topology);
        leader.set_leader(20);
        leader.initialize();

        let lock = leader.lock().unwrap();
        assert_eq!(lock.capacity(), 3);
        assert_eq!(lock.index_of(10), Some(0));
        assert_eq!(lock.index_of(20), Some(1));
        assert_eq!(lock.index_of(30), Some(2));
        assert_eq!(leader.other_node_ids(), vec![10, 30]);
    }

    #[test]
    fn test_non_leader_has_no_lock() {
        let (node, _) = component(2, GraphTopology::complete(3).unwrap());
        node.initialize();
        assert!(node.lock().is_none());
        assert!(!node.is_leader());
    }

    #[test]
    fn test_leader_grants_permission_in_arrival_direction() {
        let (leader, transport) = component(0, GraphTopology::complete(4).unwrap());
        leader.initialize();

        leader.message_received(Direction::Peer, message(MessageKind::EnterRequest, 3, 0, 0));

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        let (direction, reply) = &sent[0];
        assert_eq!(*direction, Direction::Peer);
        assert_eq!(reply.kind(), MessageKind::EnterPermission);
        assert_eq!(reply.header.to, 3);
        assert_eq!(leader.lock().unwrap().ticket(3), Some(1));
        assert_eq!(leader.stats().permissions_granted, 1);

        leader.message_received(Direction::Down, message(MessageKind::LeaveNotification, 3, 0, 0));
        assert_eq!(leader.lock().unwrap().ticket(3), Some(0));
        assert_eq!(leader.stats().notifications_handled, 1);
    }

    #[test]
    fn test_non_leader_ignores_requests() {
        let (node, transport) = component(1, GraphTopology::complete(3).unwrap());
        node.initialize();

        node.message_received(Direction::Down, message(MessageKind::EnterRequest, 2, 1, 1));
        node.message_received(Direction::Down, message(MessageKind::LeaveNotification, 2, 1, 1));
        assert!(transport.take().is_empty());
    }

    #[test]
    fn test_permission_without_callback_exits() {
        let (node, transport) = component(2, GraphTopology::complete(3).unwrap());
        node.initialize();

        node.message_received(Direction::Down, message(MessageKind::EnterPermission, 0, 2, 2));

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.kind(), MessageKind::LeaveNotification);
        assert_eq!(sent[0].1.header.to, 0);
        assert_eq!(node.stats().permissions_received, 1);
    }

    #[test]
    fn test_permission_runs_callback() {
        let (node, transport) = component(2, GraphTopology::complete(3).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        node.set_callback(move |component| {
            assert_eq!(component.node_id(), 2);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        node.message_received(Direction::Down, message(MessageKind::EnterPermission, 0, 2, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(transport.take().is_empty());

        node.clear_callback();
        node.message_received(Direction::Down, message(MessageKind::EnterPermission, 0, 2, 2));
        assert_eq!(transport.take().len(), 1);
    }

    #[test]
    fn test_relay_rewrites_routing_fields() {
        let (relay, transport) = component(2, GraphTopology::line(5).unwrap());
        let mut inbound = message(MessageKind::EnterRequest, 4, 0, 2);
        inbound.header.sequence_id = 9;
        inbound.payload = Some(Bytes::from_static(b"opaque"));

        relay.message_received(Direction::Up, inbound);

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        let (direction, forwarded) = &sent[0];
        assert_eq!(*direction, Direction::Up);
        assert_eq!(forwarded.header.to, 0);
        assert_eq!(forwarded.header.from, 4);
        assert_eq!(forwarded.header.next_hop, 1);
        assert_eq!(forwarded.header.interface_id, "2-1");
        assert_eq!(forwarded.header.sequence_id, 9);
        assert_eq!(forwarded.payload.as_deref(), Some(&b"opaque"[..]));
        assert_eq!(relay.stats().messages_relayed, 1);
    }

    #[test]
    fn test_relay_only_when_next_hop() {
        let (node, transport) = component(2, GraphTopology::line(5).unwrap());
        node.message_received(Direction::Down, message(MessageKind::EnterRequest, 4, 0, 3));
        assert!(transport.take().is_empty());
        assert_eq!(node.stats().messages_relayed, 0);
    }

    #[test]
    fn test_relay_drops_unreachable() {
        let topology = GraphTopology::from_edges([0, 1, 2], [(1, 2)]).unwrap();
        let (node, transport) = component(1, topology);

        node.message_received(Direction::Down, message(MessageKind::EnterRequest, 2, 0, 1));
        assert!(transport.take().is_empty());
        assert_eq!(node.stats().messages_dropped, 1);
    }

    #[test]
    fn test_unreachable_leader_drops_request() {
        let topology = GraphTopology::from_edges([0, 1], Vec::<(NodeId, NodeId)>::new()).unwrap();
        let (node, transport) = component(1, topology);

        node.enter_critical_section();
        assert!(transport.take().is_empty());
        assert_eq!(node.stats().requests_sent, 0);
        assert_eq!(node.stats().messages_dropped, 1);
    }

    #[test]
    fn test_uninitialized_leader_drops_request() {
        let (leader, transport) = component(0, GraphTopology::complete(2).unwrap());
        leader.message_received(Direction::Down, message(MessageKind::EnterRequest, 1, 0, 0));
        assert!(transport.take().is_empty());
        assert_eq!(leader.stats().messages_dropped, 1);
    }

    #[test]
    fn test_reinitialize_keeps_leader_tickets() {
        let (leader, _) = component(0, GraphTopology::complete(4).unwrap());
        leader.initialize();
        let lock = leader.lock().unwrap();
        lock.lock(2);

        leader.initialize();

        assert!(Arc::ptr_eq(&lock, &leader.lock().unwrap()));
        assert_eq!(leader.lock().unwrap().ticket(2), Some(1));
    }

    #[test]
    fn test_reply_direction_passed_to_transport() {
        let (leader, transport) = component(0, GraphTopology::complete(3).unwrap());
        leader.initialize();

        leader.message_received(Direction::None, message(MessageKind::EnterRequest, 1, 0, 0));

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Direction::None);
        assert_eq!(sent[0].1.kind(), MessageKind::EnterPermission);
    }

    fn counter_value(rendered: &str, name: &str) -> Option<u64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find(|line| line.split_whitespace().next() == Some(name))
            .and_then(|line| line.split_whitespace().last())
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value as u64)
    }

    #[test]
    fn test_protocol_counters_recorded() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            crate::metrics::describe_metrics();

            let (leader, _) = component(0, GraphTopology::line(3).unwrap());
            leader.initialize();
            leader.message_received(Direction::Down, message(MessageKind::EnterRequest, 2, 0, 0));

            let (relay, _) = component(1, GraphTopology::line(3).unwrap());
            relay.message_received(Direction::Down, message(MessageKind::EnterRequest, 2, 0, 1));

            let topology = GraphTopology::from_edges([0, 1], Vec::<(NodeId, NodeId)>::new()).unwrap();
            let (isolated, _) = component(1, topology);
            isolated.enter_critical_section();
        });

        let rendered = handle.render();
        assert_eq!(counter_value(&rendered, PERMISSIONS_GRANTED_TOTAL), Some(1));
        assert_eq!(counter_value(&rendered, MESSAGES_RELAYED_TOTAL), Some(1));
        assert_eq!(counter_value(&rendered, MESSAGES_DROPPED_TOTAL), Some(1));
        assert!(rendered.contains("# HELP bakehouse_messages_relayed_total"));
    }
}
