//! Round-robin run over a local cluster
//!
//! Every node asks for the critical section in ascending id order. A node
//! holds the section for a fixed time, then leaves; the next node only asks
//! once the leader has applied the previous leave notification.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bakehouse_common::{BakehouseError, NodeId, Result};
use bakehouse_core::{ExclusionStats, LocalCluster};
use tracing::{info, warn};

/// Outcome of [`run_rounds`]
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub rounds: usize,
    pub elapsed: Duration,
    pub stats: BTreeMap<NodeId, ExclusionStats>,
}

/// Drive one critical section round per node on a started cluster
pub fn run_rounds(
    cluster: &LocalCluster,
    hold: Duration,
    round_timeout: Duration,
) -> Result<RoundReport> {
    let leader = cluster
        .leader()
        .ok_or(BakehouseError::NodeNotExist(cluster.leader_id()))?;

    cluster.set_callback(move |node| {
        info!(node = node.node_id(), "Entered critical section");
        std::thread::sleep(hold);
        info!(node = node.node_id(), "Leaving critical section");
        node.exit_critical_section();
    });

    let started = Instant::now();
    let baseline = leader.stats().notifications_handled;
    let mut rounds = 0;

    for id in cluster.node_ids() {
        let node = cluster
            .node(id)
            .ok_or(BakehouseError::NodeNotExist(id))?;
        node.enter_critical_section();

        let expected = baseline + rounds as u64 + 1;
        let done = cluster.wait_until(round_timeout, |_| {
            leader.stats().notifications_handled >= expected
        });
        if !done {
            warn!(node = id, timeout = ?round_timeout, "Round did not complete");
            return Err(BakehouseError::RuntimeError(format!(
                "node {} did not complete its round within {:?}",
                id, round_timeout
            )));
        }
        rounds += 1;
    }

    let elapsed = started.elapsed();
    info!(rounds, elapsed = ?elapsed, "All rounds completed");

    Ok(RoundReport {
        rounds,
        elapsed,
        stats: cluster.stats(),
    })
}
