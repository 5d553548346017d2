//! Error types for Bakehouse
//!
//! Protocol paths never surface errors to the application; these variants cover
//! infrastructure failures only (topology construction, configuration, runtime).

use crate::NodeId;

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum BakehouseError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("topology error: {0}")]
    TopologyError(String),

    #[error("node '{0}' not exist")]
    NodeNotExist(NodeId),

    #[error("unknown lock algorithm: {0}")]
    UnknownLockAlgorithm(String),

    #[error("codec error: {0}")]
    CodecError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("inbox of node '{0}' is closed")]
    InboxClosed(NodeId),

    #[error("runtime error: {0}")]
    RuntimeError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BakehouseError>;
