//! Bakehouse Core - Leader-mediated mutual exclusion over a routed group
//!
//! This crate provides:
//! - Protocol message model and wire codec
//! - Per-node exclusion component (critical section API, dispatch, relay)
//! - Graph topology with shortest-path next hops
//! - Channel transport and an in-process cluster runtime
//! - Configuration access
//! - Protocol metric names and descriptions

pub mod config;
pub mod metrics;
pub mod model;
pub mod service;

pub use config::Configuration;
pub use model::{ExclusionMessage, MessageHeader, MessageKind};
pub use service::cluster::{ClusterBuilder, LocalCluster};
pub use service::exclusion::{CriticalSectionCallback, ExclusionComponent, ExclusionStats};
pub use service::topology::{GraphTopology, TopologyKind};
pub use service::transport::{ChannelTransport, Inbound, Transport};
