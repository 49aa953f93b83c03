//! Database models.
//!
//! These map one-to-one to table rows; domain conversion lives in
//! `crate::domain`.

pub mod service_config;

pub use service_config::*;
