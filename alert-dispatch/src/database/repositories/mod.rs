//! Repository layer for database access.

pub mod service_config;

pub use service_config::*;
