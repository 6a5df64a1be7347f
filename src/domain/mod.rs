//! Domain layer for the report scheduling subsystem
//!
//! This module contains core business rules, domain models and the port
//! traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ValidationErrors};
