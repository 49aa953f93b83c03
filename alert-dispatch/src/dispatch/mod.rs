//! Event dispatch.
//!
//! An [`IssueEvent`](crate::domain::IssueEvent) fans out into one unit of work
//! per enabled service configuration of its project. Units run on a bounded
//! pool, record their outcome on their own row, and never report errors back
//! to the producer.

mod dispatcher;
mod outcome;
mod queue;

pub use dispatcher::Dispatcher;
pub use outcome::{DispatchOutcome, DispatchStats, DispatchStatsSnapshot, SkipReason};
pub use queue::DispatchHandle;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum concurrent deliveries.
    pub workers: usize,
    /// Pending events accepted before `submit` starts rejecting.
    pub queue_capacity: usize,
    /// Upper bound for one delivery, including the HTTP call.
    pub task_timeout_secs: u64,
    /// How long in-flight deliveries may run after shutdown is requested.
    pub shutdown_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 1024,
            task_timeout_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

impl DispatcherConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
