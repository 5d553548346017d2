use bakehouse_core::Configuration;
use bakehouse_core::config::{
    LEADER_ID_PROPERTY, NO_OP_DURATION_PROPERTY, TOPOLOGY_KIND_PROPERTY, TOPOLOGY_NODES_PROPERTY,
    WORKER_THREADS_PROPERTY,
};
use clap::Parser;

/// Command line options; anything given here overrides file and environment
#[derive(Parser, Debug, Clone)]
#[command(name = "bakehouse-server")]
#[command(about = "Run a local group through leader-mediated mutual exclusion", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file path without extension
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Number of nodes in the group
    #[arg(short = 'n', long = "nodes")]
    pub nodes: Option<u64>,

    /// Topology kind (complete, ring, line, star)
    #[arg(short = 't', long = "topology")]
    pub topology: Option<String>,

    /// Leader node id
    #[arg(short = 'l', long = "leader")]
    pub leader: Option<u64>,

    /// Spin delay of the lock in milliseconds
    #[arg(long = "no-op-ms")]
    pub no_op_ms: Option<u64>,

    /// Worker threads per node
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<u64>,

    /// How long each node stays inside the critical section
    #[arg(long = "hold-ms", default_value_t = 100)]
    pub hold_ms: u64,

    /// Seconds to wait for one node's round before giving up
    #[arg(long = "round-timeout", default_value_t = 30)]
    pub round_timeout_secs: u64,

    /// Log level (overrides BAKEHOUSE_LOG_LEVEL)
    #[arg(long = "log-level", env = "BAKEHOUSE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load configuration and apply the command line overrides on top
    pub fn configuration(&self) -> Result<Configuration, config::ConfigError> {
        let mut builder = Configuration::builder(self.config.as_deref());

        if let Some(nodes) = self.nodes {
            builder = builder.set_override(TOPOLOGY_NODES_PROPERTY, nodes)?;
        }
        if let Some(topology) = &self.topology {
            builder = builder.set_override(TOPOLOGY_KIND_PROPERTY, topology.as_str())?;
        }
        if let Some(leader) = self.leader {
            builder = builder.set_override(LEADER_ID_PROPERTY, leader)?;
        }
        if let Some(no_op_ms) = self.no_op_ms {
            builder = builder.set_override(NO_OP_DURATION_PROPERTY, no_op_ms)?;
        }
        if let Some(workers) = self.workers {
            builder = builder.set_override(WORKER_THREADS_PROPERTY, workers)?;
        }

        Ok(Configuration::from_config(builder.build()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakehouse_core::TopologyKind;
    use std::time::Duration;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["bakehouse-server"]).unwrap();
        assert!(cli.nodes.is_none());
        assert_eq!(cli.hold_ms, 100);
        assert_eq!(cli.round_timeout_secs, 30);
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "bakehouse-server",
            "--config",
            "/nonexistent/bakehouse",
            "-n",
            "5",
            "-t",
            "line",
            "-l",
            "2",
            "--no-op-ms",
            "3",
            "-w",
            "2",
        ])
        .unwrap();

        let configuration = cli.configuration().unwrap();
        assert_eq!(configuration.topology_nodes().unwrap(), 5);
        assert_eq!(configuration.topology_kind().unwrap(), TopologyKind::Line);
        assert_eq!(configuration.leader_id().unwrap(), 2);
        assert_eq!(configuration.no_op_duration().unwrap(), Duration::from_millis(3));
        assert_eq!(configuration.worker_threads().unwrap(), 2);
    }

    #[test]
    fn test_rejects_non_numeric_nodes() {
        assert!(Cli::try_parse_from(["bakehouse-server", "-n", "many"]).is_err());
    }
}
