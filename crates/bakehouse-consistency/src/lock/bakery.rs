//! Lamport's Bakery algorithm over virtualized process indices

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bakehouse_common::NodeId;
use parking_lot::RwLock;
use tracing::trace;

use super::{ExclusionLock, LockAlgorithm, ProcessRegistry, SpinWait};

/// Bakery lock for a fixed number of processes.
///
/// A process takes a ticket with [`lock`](ExclusionLock::lock), waits in
/// [`enter`](ExclusionLock::enter) until no other active process holds a smaller
/// ticket (ties broken by lower slot index), and drops its ticket with
/// [`unlock`](ExclusionLock::unlock).
pub struct BakeryLock {
    registry: RwLock<ProcessRegistry>,
    /// Set while the slot's ticket is being computed
    entering: Box<[AtomicBool]>,
    /// 0 means not requesting and not holding
    tickets: Box<[AtomicU64]>,
    spin: Arc<dyn SpinWait>,
}

impl BakeryLock {
    pub fn new(capacity: usize, spin: Arc<dyn SpinWait>) -> Self {
        Self {
            registry: RwLock::new(ProcessRegistry::new(capacity)),
            entering: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            tickets: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            spin,
        }
    }

    /// Registered pids in slot order
    pub fn members(&self) -> Vec<NodeId> {
        self.registry.read().members()
    }

    fn max_ticket(&self) -> u64 {
        self.tickets
            .iter()
            .map(|ticket| ticket.load(Ordering::SeqCst))
            .max()
            .unwrap_or(0)
    }

    /// Whether slot `j` currently goes before slot `i`
    fn has_priority(&self, j: usize, i: usize) -> bool {
        let other = self.tickets[j].load(Ordering::SeqCst);
        let own = self.tickets[i].load(Ordering::SeqCst);
        other != 0 && (other < own || (other == own && j < i))
    }
}

impl ExclusionLock for BakeryLock {
    fn algorithm(&self) -> LockAlgorithm {
        LockAlgorithm::Bakery
    }

    fn capacity(&self) -> usize {
        self.tickets.len()
    }

    fn add_process(&self, pid: NodeId) -> Option<usize> {
        self.registry.write().add_process(pid)
    }

    fn remove_process(&self, pid: NodeId) -> Option<usize> {
        let index = self.registry.write().remove_process(pid)?;
        self.tickets[index].store(0, Ordering::SeqCst);
        self.entering[index].store(false, Ordering::SeqCst);
        Some(index)
    }

    fn index_of(&self, pid: NodeId) -> Option<usize> {
        self.registry.read().index_of(pid)
    }

    fn pid_at(&self, index: usize) -> Option<NodeId> {
        self.registry.read().pid_at(index)
    }

    fn lock(&self, pid: NodeId) {
        let Some(i) = self.index_of(pid) else {
            return;
        };

        self.entering[i].store(true, Ordering::SeqCst);
        let ticket = self.max_ticket() + 1;
        self.tickets[i].store(ticket, Ordering::SeqCst);
        self.entering[i].store(false, Ordering::SeqCst);

        trace!(pid, index = i, ticket, "Bakery ticket taken");
    }

    fn unlock(&self, pid: NodeId) {
        let Some(i) = self.index_of(pid) else {
            return;
        };

        self.tickets[i].store(0, Ordering::SeqCst);
        trace!(pid, index = i, "Bakery ticket released");
    }

    fn enter(&self, pid: NodeId) {
        let (i, occupied) = {
            let registry = self.registry.read();
            let Some(i) = registry.index_of(pid) else {
                return;
            };
            (i, registry.occupied())
        };

        for j in occupied.into_iter().filter(|j| *j != i) {
            while self.entering[j].load(Ordering::SeqCst) {
                self.spin.pause();
            }
            while self.has_priority(j, i) {
                self.spin.pause();
            }
        }

        trace!(pid, index = i, "Bakery enter granted");
    }

    fn ticket(&self, pid: NodeId) -> Option<u64> {
        self.index_of(pid)
            .map(|i| self.tickets[i].load(Ordering::SeqCst))
    }
}
