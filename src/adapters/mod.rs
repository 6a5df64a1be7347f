//! Infrastructure adapters for external systems.

pub mod artifacts;
pub mod email;
pub mod http;
pub mod sqlite;
