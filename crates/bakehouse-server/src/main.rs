//! Main entry point for the Bakehouse demo runtime.
//!
//! Builds a local group from configuration, starts it and lets every node
//! pass through the critical section once.

use std::time::Duration;

use anyhow::Context;
use bakehouse_core::ClusterBuilder;
use bakehouse_server::{Cli, metrics, run_rounds, startup};
use clap::Parser;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging_config = startup::LoggingConfig::from_env();
    if let Some(level) = &cli.log_level {
        logging_config = logging_config.with_level(level);
    }
    let _logging_guard = startup::init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let metrics_handle = metrics::init_metrics().context("Failed to install metrics recorder")?;

    let configuration = cli.configuration().context("Failed to load configuration")?;
    let mut cluster = ClusterBuilder::from_configuration(&configuration)?
        .build()
        .context("Failed to build local cluster")?;

    info!(
        nodes = cluster.node_ids().len(),
        leader = cluster.leader_id(),
        topology = %configuration.topology_kind()?,
        "Starting Bakehouse"
    );
    cluster.start()?;

    let report = run_rounds(
        &cluster,
        Duration::from_millis(cli.hold_ms),
        Duration::from_secs(cli.round_timeout_secs),
    )?;

    for (id, stats) in &report.stats {
        info!(node = id, stats = %serde_json::to_string(stats)?, "Node statistics");
    }

    info!(metrics = %metrics_handle.render(), "Protocol metrics");

    cluster.shutdown()?;
    info!(rounds = report.rounds, "Bakehouse finished");
    Ok(())
}
