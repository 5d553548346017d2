//! Mutual Exclusion Lock Implementation
//!
//! This module provides:
//! - Process index registry with slot reuse
//! - Lock trait and algorithm selection
//! - Bakery algorithm strategy
//! - Spin primitives

mod bakery;
mod model;
mod registry;
mod spin;

pub use bakery::*;
pub use model::*;
pub use registry::*;
pub use spin::*;
