//! Lock abstraction and algorithm selection

use std::sync::Arc;

use bakehouse_common::{BakehouseError, NodeId};
use serde::{Deserialize, Serialize};

use super::{BakeryLock, SpinWait};

/// Mutual exclusion lock over arbitrary positive pids.
///
/// Every operation taking a pid is a silent no-op for unregistered pids.
pub trait ExclusionLock: Send + Sync {
    /// Strategy implemented by this lock
    fn algorithm(&self) -> LockAlgorithm;

    /// Number of process slots, fixed at construction
    fn capacity(&self) -> usize;

    /// Register a pid, returning its slot index or `None` when full
    fn add_process(&self, pid: NodeId) -> Option<usize>;

    /// Unregister a pid, returning the freed slot index
    fn remove_process(&self, pid: NodeId) -> Option<usize>;

    fn index_of(&self, pid: NodeId) -> Option<usize>;

    fn pid_at(&self, index: usize) -> Option<NodeId>;

    /// Announce the intent of `pid` to enter the critical section
    fn lock(&self, pid: NodeId);

    /// Leave the critical section
    fn unlock(&self, pid: NodeId);

    /// Block until `pid` has priority over every other contender
    fn enter(&self, pid: NodeId);

    /// Current priority number of `pid` (0 when idle)
    fn ticket(&self, pid: NodeId) -> Option<u64>;
}

/// Available lock strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAlgorithm {
    #[default]
    Bakery,
}

impl LockAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            LockAlgorithm::Bakery => "bakery",
        }
    }

    /// Build a lock of this strategy with `capacity` slots
    pub fn build(self, capacity: usize, spin: Arc<dyn SpinWait>) -> Arc<dyn ExclusionLock> {
        match self {
            LockAlgorithm::Bakery => Arc::new(BakeryLock::new(capacity, spin)),
        }
    }
}

impl std::fmt::Display for LockAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LockAlgorithm {
    type Err = BakehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bakery" => Ok(LockAlgorithm::Bakery),
            _ => Err(BakehouseError::UnknownLockAlgorithm(s.to_string())),
        }
    }
}
