//! Infrastructure layer module
//!
//! - Configuration management
//! - Logging infrastructure
//! - Runtime bootstrap from configuration

pub mod config;
pub mod logging;
pub mod setup;
