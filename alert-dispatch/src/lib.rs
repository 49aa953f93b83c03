//! alert-dispatch library crate.
//!
//! Turns issue lifecycle events from an error tracker into notifications on
//! Jira Cloud, GitHub Issues, Microsoft Teams, PagerDuty or a generic webhook,
//! tracking per-configuration delivery health.

pub mod api;
pub mod backends;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod logging;
pub mod service;

pub use error::{Error, Result};
