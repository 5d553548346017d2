//! Logging setup for the Bakehouse runtime.
//!
//! Console output plus optional rolling log files. Besides the root
//! `bakehouse.log`, events are routed by `tracing` target into per-component
//! files:
//!
//! | Log File       | Component                        | Target Prefixes                        |
//! |----------------|----------------------------------|----------------------------------------|
//! | protocol.log   | Exclusion protocol and relay     | bakehouse_core::service::exclusion     |
//! | lock.log       | Lock algorithms                  | bakehouse_consistency                  |
//! | runtime.log    | Cluster runtime and transport    | bakehouse_core::service::cluster, ...  |
//!
//! Log files are stored in `~/bakehouse/logs` by default.
//! Override with the `BAKEHOUSE_LOG_DIR` environment variable.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Internal definition for a component log file.
struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "protocol.log",
        targets: &["bakehouse_core::service::exclusion"],
    },
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["bakehouse_consistency"],
    },
    ComponentLogDef {
        file_name: "runtime.log",
        targets: &[
            "bakehouse_core::service::cluster",
            "bakehouse_core::service::transport",
            "bakehouse_server",
        ],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the whole process.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/bakehouse/logs`)
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    /// File logging is opt-in
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/bakehouse/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let log_dir = std::env::var("BAKEHOUSE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_log_dir());

        let console_output = std::env::var("BAKEHOUSE_LOG_CONSOLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        let file_logging = std::env::var("BAKEHOUSE_LOG_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let console_level = std::env::var("BAKEHOUSE_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        let file_level = std::env::var("BAKEHOUSE_LOG_FILE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(console_level);

        Self {
            log_dir,
            console_output,
            console_level,
            file_logging,
            file_level,
            rotation: LogRotation::Daily,
        }
    }

    /// Override both levels, keeping the previous ones when `level` does not parse
    pub fn with_level(mut self, level: &str) -> Self {
        if let Ok(level) = level.parse::<Level>() {
            self.console_level = level;
            self.file_level = level;
        }
        self
    }
}

/// Guard that keeps the file writers alive; buffered output is flushed on drop.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize console and file logging.
///
/// `RUST_LOG` takes precedence over the configured levels for the console and
/// the root file; component files capture everything from their targets.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "bakehouse.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            component_files = COMPONENT_LOGS.len(),
            "File logging initialized"
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
