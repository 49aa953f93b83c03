//! Per-unit dispatch results and counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::backends::{DeliveryError, DeliveryReceipt};

/// Why a configuration was not called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// `only_new_issues` is set and the trigger is not `New`.
    OnlyNewIssues,
    /// Stored settings could not be decoded.
    UndecodableSettings,
    /// The dispatcher stopped before a worker became free.
    ShuttingDown,
}

/// Result of one (event, configuration) unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered {
        config_id: String,
        kind: String,
        receipt: DeliveryReceipt,
    },
    Failed {
        config_id: String,
        kind: String,
        #[serde(serialize_with = "serialize_error")]
        error: DeliveryError,
    },
    Skipped {
        config_id: String,
        kind: String,
        reason: SkipReason,
    },
}

fn serialize_error<S: serde::Serializer>(
    error: &DeliveryError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;

    let mut state = serializer.serialize_struct("DeliveryError", 4)?;
    state.serialize_field("kind", &error.kind)?;
    state.serialize_field("message", &error.message)?;
    state.serialize_field("status_code", &error.status_code)?;
    state.serialize_field("body", &error.body)?;
    state.end()
}

impl DispatchOutcome {
    pub fn config_id(&self) -> &str {
        match self {
            Self::Delivered { config_id, .. }
            | Self::Failed { config_id, .. }
            | Self::Skipped { config_id, .. } => config_id,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Running totals since startup.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Events refused because the queue was full.
    pub rejected: u64,
}

impl DispatchStats {
    pub(crate) fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Delivered { .. } => &self.delivered,
            DispatchOutcome::Failed { .. } => &self.failed,
            DispatchOutcome::Skipped { .. } => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
