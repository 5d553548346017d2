//! Configuration for Bakehouse
//!
//! Values come from `conf/application.yml` (optional) and `BAKEHOUSE__*`
//! environment variables, where `__` separates nesting levels, e.g.
//! `BAKEHOUSE__LOCK__ALGORITHM=bakery`.

use std::time::Duration;

use bakehouse_common::{
    BakehouseError, DEFAULT_LEADER_ID, DEFAULT_NO_OP_DURATION_MS, DEFAULT_WORKER_THREADS, NodeId,
    Result,
};
use bakehouse_consistency::LockAlgorithm;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};

use crate::service::topology::TopologyKind;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application";
pub const DEFAULT_TOPOLOGY_NODES: u64 = 10;

pub const LEADER_ID_PROPERTY: &str = "bakehouse.leader_id";
pub const WORKER_THREADS_PROPERTY: &str = "bakehouse.worker_threads";
pub const LOCK_ALGORITHM_PROPERTY: &str = "bakehouse.lock.algorithm";
pub const NO_OP_DURATION_PROPERTY: &str = "bakehouse.lock.no_op_duration_ms";
pub const TOPOLOGY_KIND_PROPERTY: &str = "bakehouse.topology.kind";
pub const TOPOLOGY_NODES_PROPERTY: &str = "bakehouse.topology.nodes";

/// Application configuration wrapper
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Builder preloaded with the config file and environment sources
    pub fn builder(file: Option<&str>) -> ConfigBuilder<DefaultState> {
        Config::builder()
            .add_source(File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix("bakehouse")
                    .prefix_separator("__")
                    .separator("__")
                    .keep_prefix(true)
                    .try_parsing(true),
            )
    }

    /// Load from the default sources
    pub fn load(file: Option<&str>) -> Result<Self> {
        let config = Self::builder(file)
            .build()
            .map_err(|e| BakehouseError::ConfigError(e.to_string()))?;
        Ok(Self { config })
    }

    /// Non-negative integer at `key`, `default` when unset
    fn get_non_negative(&self, key: &str, default: u64) -> Result<u64> {
        match self.config.get_int(key) {
            Ok(value) => u64::try_from(value).map_err(|_| {
                BakehouseError::ConfigError(format!("{} must not be negative, got {}", key, value))
            }),
            Err(config::ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(BakehouseError::ConfigError(e.to_string())),
        }
    }

    pub fn leader_id(&self) -> Result<NodeId> {
        self.get_non_negative(LEADER_ID_PROPERTY, DEFAULT_LEADER_ID)
    }

    /// Workers per node; zero is passed through for the cluster builder to reject
    pub fn worker_threads(&self) -> Result<usize> {
        let workers = self.get_non_negative(WORKER_THREADS_PROPERTY, DEFAULT_WORKER_THREADS as u64)?;
        usize::try_from(workers).map_err(|e| BakehouseError::ConfigError(e.to_string()))
    }

    pub fn lock_algorithm(&self) -> Result<LockAlgorithm> {
        match self.config.get_string(LOCK_ALGORITHM_PROPERTY) {
            Ok(value) => value.parse(),
            Err(_) => Ok(LockAlgorithm::default()),
        }
    }

    /// Pause of one spin step of the lock
    pub fn no_op_duration(&self) -> Result<Duration> {
        self.get_non_negative(NO_OP_DURATION_PROPERTY, DEFAULT_NO_OP_DURATION_MS)
            .map(Duration::from_millis)
    }

    pub fn topology_kind(&self) -> Result<TopologyKind> {
        match self.config.get_string(TOPOLOGY_KIND_PROPERTY) {
            Ok(value) => value.parse(),
            Err(_) => Ok(TopologyKind::default()),
        }
    }

    pub fn topology_nodes(&self) -> Result<u64> {
        self.get_non_negative(TOPOLOGY_NODES_PROPERTY, DEFAULT_TOPOLOGY_NODES)
    }
}
