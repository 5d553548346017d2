//! Process Index Registry
//!
//! Maps arbitrary positive pids to dense slot indices in `[0, capacity)` and back.
//! The lowest free slot is always chosen, so a re-added process may land on a
//! previously freed index.

use std::collections::HashMap;

use bakehouse_common::NodeId;

/// Fixed-capacity arena of process slots
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    /// Marks which slot indices are unused
    free: Vec<bool>,
    /// Slot index -> pid
    slots: Vec<Option<NodeId>>,
    /// Pid -> slot index
    indices: HashMap<NodeId, usize>,
}

impl ProcessRegistry {
    /// Create a registry with `capacity` slots, all free
    pub fn new(capacity: usize) -> Self {
        Self {
            free: vec![true; capacity],
            slots: vec![None; capacity],
            indices: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.free.len()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Register a pid in the lowest free slot.
    ///
    /// Returns the slot index, or `None` when every slot is taken. A pid that is
    /// already registered keeps its slot.
    pub fn add_process(&mut self, pid: NodeId) -> Option<usize> {
        if let Some(index) = self.indices.get(&pid) {
            return Some(*index);
        }

        let index = self.free.iter().position(|free| *free)?;
        self.free[index] = false;
        self.slots[index] = Some(pid);
        self.indices.insert(pid, index);
        Some(index)
    }

    /// Unregister a pid, returning the freed slot index
    pub fn remove_process(&mut self, pid: NodeId) -> Option<usize> {
        let index = self.indices.remove(&pid)?;
        self.free[index] = true;
        self.slots[index] = None;
        Some(index)
    }

    pub fn index_of(&self, pid: NodeId) -> Option<usize> {
        self.indices.get(&pid).copied()
    }

    /// Pid occupying `index`, `None` for free or out-of-range slots
    pub fn pid_at(&self, index: usize) -> Option<NodeId> {
        self.slots.get(index).copied().flatten()
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.free.get(index).copied().unwrap_or(true)
    }

    /// Indices of all occupied slots, ascending
    pub fn occupied(&self) -> Vec<usize> {
        self.free
            .iter()
            .enumerate()
            .filter(|(_, free)| !**free)
            .map(|(index, _)| index)
            .collect()
    }

    /// Registered pids in slot order
    pub fn members(&self) -> Vec<NodeId> {
        self.slots.iter().filter_map(|pid| *pid).collect()
    }
}
