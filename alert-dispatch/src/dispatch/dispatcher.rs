//! Fan-out of one event to its project's service configurations.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::outcome::{DispatchOutcome, DispatchStats, SkipReason};
use super::queue::RunnerSlot;
use super::DispatcherConfig;
use crate::backends::{BackendRegistry, DeliveryError};
use crate::database::models::ServiceConfigDbModel;
use crate::database::repositories::ServiceConfigRepository;
use crate::domain::{FailureInfo, IssueEvent, ServiceConfig};

/// Evaluates events against service configurations and invokes backends.
///
/// Cloning is cheap; all clones share the worker pool, counters and
/// cancellation token.
#[derive(Clone)]
pub struct Dispatcher {
    pub(super) config: DispatcherConfig,
    repo: Arc<dyn ServiceConfigRepository>,
    registry: Arc<BackendRegistry>,
    /// Bounds concurrent deliveries across all events.
    semaphore: Arc<Semaphore>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) stats: Arc<DispatchStats>,
    pub(super) runner: RunnerSlot,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        repo: Arc<dyn ServiceConfigRepository>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            config,
            repo,
            registry,
            cancellation_token: CancellationToken::new(),
            stats: Arc::new(DispatchStats::default()),
            runner: RunnerSlot::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    /// Dispatch one event to every enabled configuration of its project and
    /// wait for all units to finish.
    ///
    /// Never fails: per-unit errors end up in the returned outcomes and in the
    /// configurations' failure fields.
    pub async fn dispatch(&self, event: &IssueEvent) -> Vec<DispatchOutcome> {
        let rows = match self.repo.list_enabled_for_project(&event.project_id).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    project_id = %event.project_id,
                    issue_id = %event.issue_id,
                    "Failed to load service configs: {}",
                    e
                );
                return Vec::new();
            }
        };

        if rows.is_empty() {
            debug!(project_id = %event.project_id, "No enabled service configs");
            return Vec::new();
        }

        let event = Arc::new(event.clone());
        let mut outcomes = Vec::with_capacity(rows.len());
        let mut units = JoinSet::new();

        for row in rows {
            if !event.trigger.is_allowed(row.only_new_issues) {
                debug!(
                    config_id = %row.id,
                    trigger = %event.trigger,
                    "Skipping service config limited to new issues"
                );
                let outcome = DispatchOutcome::Skipped {
                    config_id: row.id,
                    kind: row.kind,
                    reason: SkipReason::OnlyNewIssues,
                };
                self.stats.record(&outcome);
                outcomes.push(outcome);
                continue;
            }

            let dispatcher = self.clone();
            let event = event.clone();
            units.spawn(async move { dispatcher.run_unit(row, &event).await });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(issue_id = %event.issue_id, "Dispatch unit panicked: {}", e),
            }
        }

        outcomes
    }

    async fn run_unit(&self, row: ServiceConfigDbModel, event: &IssueEvent) -> DispatchOutcome {
        if let Err(err) = self.registry.resolve(&row.kind) {
            error!(config_id = %row.id, kind = %row.kind, "{}", err);
            self.persist_failure(&row.id, &err).await;
            let outcome = DispatchOutcome::Failed {
                config_id: row.id,
                kind: row.kind,
                error: err,
            };
            self.stats.record(&outcome);
            return outcome;
        }

        let config = match ServiceConfig::from_db_model(&row) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    config_id = %row.id,
                    kind = %row.kind,
                    "Skipping service config with undecodable settings: {}",
                    e
                );
                let outcome = DispatchOutcome::Skipped {
                    config_id: row.id,
                    kind: row.kind,
                    reason: SkipReason::UndecodableSettings,
                };
                self.stats.record(&outcome);
                return outcome;
            }
        };

        self.deliver(&config, event).await
    }

    /// Deliver to a single configuration and record the outcome on its row.
    ///
    /// Ignores `enabled` and `only_new_issues`; callers decide eligibility.
    pub async fn deliver(&self, config: &ServiceConfig, event: &IssueEvent) -> DispatchOutcome {
        let kind = config.kind().to_string();

        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.skipped_on_shutdown(config, kind),
            },
            _ = self.cancellation_token.cancelled() => {
                return self.skipped_on_shutdown(config, kind);
            }
        };

        let started = Instant::now();
        let timeout = self.config.task_timeout();
        let result =
            match tokio::time::timeout(timeout, self.registry.deliver(event, &config.settings))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::network(format!(
                    "Delivery timed out after {}s",
                    timeout.as_secs()
                ))),
            };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(receipt) => {
                match self.repo.record_success(&config.id).await {
                    Ok(true) => info!(config_id = %config.id, kind = %kind, "Service config recovered"),
                    Ok(false) => {}
                    Err(e) => error!(config_id = %config.id, "Failed to clear failure state: {}", e),
                }
                info!(
                    config_id = %config.id,
                    kind = %kind,
                    issue_id = %event.issue_id,
                    external_id = receipt.external_id.as_deref().unwrap_or("-"),
                    elapsed_ms,
                    "Notification delivered"
                );
                DispatchOutcome::Delivered {
                    config_id: config.id.clone(),
                    kind,
                    receipt,
                }
            }
            Err(err) => {
                warn!(
                    config_id = %config.id,
                    kind = %kind,
                    issue_id = %event.issue_id,
                    error_kind = %err.kind,
                    status_code = err.status_code,
                    elapsed_ms,
                    "Notification delivery failed: {}",
                    err.message
                );
                self.persist_failure(&config.id, &err).await;
                DispatchOutcome::Failed {
                    config_id: config.id.clone(),
                    kind,
                    error: err,
                }
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    fn skipped_on_shutdown(&self, config: &ServiceConfig, kind: String) -> DispatchOutcome {
        debug!(config_id = %config.id, "Dispatcher stopping, delivery not started");
        let outcome = DispatchOutcome::Skipped {
            config_id: config.id.clone(),
            kind,
            reason: SkipReason::ShuttingDown,
        };
        self.stats.record(&outcome);
        outcome
    }

    async fn persist_failure(&self, config_id: &str, err: &DeliveryError) {
        let failure = FailureInfo::from_error(err, Utc::now());
        match self.repo.record_failure(config_id, &failure).await {
            Ok(false) => warn!(config_id = %config_id, "Service config entered failing state"),
            Ok(true) => {}
            Err(e) => error!(config_id = %config_id, "Failed to record delivery failure: {}", e),
        }
    }
}
