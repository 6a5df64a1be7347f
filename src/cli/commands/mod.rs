//! CLI command implementations.

pub mod migrate;
pub mod runs;
pub mod schedule;
pub mod serve;
