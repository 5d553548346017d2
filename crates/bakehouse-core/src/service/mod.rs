pub mod cluster;
pub mod exclusion;
pub mod topology;
pub mod transport;
