//! Bakehouse Consistency - Mutual exclusion algorithms
//!
//! This crate provides:
//! - Process index registry (arbitrary pids to dense slot indices)
//! - Lock abstraction with pluggable strategies
//! - Lamport's Bakery algorithm over virtualized indices
//! - Injectable spin primitive for the busy-wait loops

pub mod lock;

// Re-export lock types
pub use lock::{
    BakeryLock, ExclusionLock, FixedDelay, LockAlgorithm, ProcessRegistry, SpinWait,
};
