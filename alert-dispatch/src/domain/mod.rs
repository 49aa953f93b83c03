//! Core domain types.

mod event;
mod service_config;

pub use event::{IssueEvent, Trigger};
pub use service_config::{FailureInfo, ServiceConfig};
