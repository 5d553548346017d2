//! Bakehouse demo runtime
//!
//! Command line parsing, logging and metrics setup, and the round-robin run that drives a
//! local cluster through the exclusion protocol.

pub mod cli;
pub mod demo;
pub mod metrics;
pub mod startup;

pub use cli::Cli;
pub use demo::{RoundReport, run_rounds};
