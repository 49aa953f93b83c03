//! Validated create, update and test operations on service configurations.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::backends::{BackendInfo, BackendRegistry};
use crate::backends::validate::non_blank;
use crate::database::models::ServiceConfigDbModel;
use crate::database::repositories::ServiceConfigRepository;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::domain::{IssueEvent, ServiceConfig};
use crate::{Error, Result};

fn default_true() -> bool {
    true
}

/// Request to create a service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceConfig {
    pub kind: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub only_new_issues: bool,
    pub settings: Value,
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfigUpdate {
    /// Accepted only when equal to the stored kind.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub only_new_issues: Option<bool>,
    /// Full replacement settings, validated against the stored kind.
    #[serde(default)]
    pub settings: Option<Value>,
    /// Expected current version, for optimistic concurrency.
    #[serde(default)]
    pub version: Option<i64>,
}

pub struct ServiceConfigService {
    repo: Arc<dyn ServiceConfigRepository>,
    registry: Arc<BackendRegistry>,
    dispatcher: Dispatcher,
    public_url: String,
}

impl ServiceConfigService {
    pub fn new(
        repo: Arc<dyn ServiceConfigRepository>,
        registry: Arc<BackendRegistry>,
        dispatcher: Dispatcher,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            registry,
            dispatcher,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn backends(&self) -> Vec<BackendInfo> {
        self.registry.backends()
    }

    pub async fn create(&self, project_id: &str, request: NewServiceConfig) -> Result<ServiceConfig> {
        if project_id.trim().is_empty() {
            return Err(Error::validation("project_id is required"));
        }

        let settings = self.registry.validate_settings(&request.kind, request.settings)?;
        let kind = settings.kind();
        let display_name =
            non_blank(request.display_name).unwrap_or_else(|| kind.display_name().to_string());

        let mut model =
            ServiceConfigDbModel::new(project_id, kind.as_str(), display_name, settings.to_stored()?);
        model.enabled = request.enabled;
        model.only_new_issues = request.only_new_issues;

        self.repo.create(&model).await?;
        info!(config_id = %model.id, project_id, kind = %kind, "Service config created");

        ServiceConfig::from_db_model(&model)
    }

    pub async fn update(&self, id: &str, update: ServiceConfigUpdate) -> Result<ServiceConfig> {
        let mut model = self.repo.get(id).await?;

        if let Some(kind) = update.kind.as_deref()
            && kind != model.kind
        {
            return Err(Error::KindImmutable {
                from: model.kind,
                to: kind.to_string(),
            });
        }

        if let Some(expected) = update.version
            && expected != model.version
        {
            return Err(Error::conflict(format!(
                "ServiceConfig {} is at version {}, not {}",
                id, model.version, expected
            )));
        }

        if let Some(display_name) = update.display_name {
            model.display_name = match non_blank(Some(display_name)) {
                Some(name) => name,
                None => self.registry.resolve(&model.kind).map_or_else(
                    |_| model.kind.clone(),
                    |kind| kind.display_name().to_string(),
                ),
            };
        }
        if let Some(enabled) = update.enabled {
            model.enabled = enabled;
        }
        if let Some(only_new_issues) = update.only_new_issues {
            model.only_new_issues = only_new_issues;
        }
        if let Some(mut raw) = update.settings {
            // Forms echo back the masked credentials they were shown.
            if let Ok(current) = ServiceConfig::from_db_model(&model) {
                current.settings.restore_secrets(&mut raw)?;
            }
            model.settings = self.registry.validate_settings(&model.kind, raw)?.to_stored()?;
        }

        let updated = self.repo.update(&model).await?;
        info!(config_id = %updated.id, version = updated.version, "Service config updated");

        ServiceConfig::from_db_model(&updated)
    }

    pub async fn get(&self, id: &str) -> Result<ServiceConfig> {
        ServiceConfig::from_db_model(&self.repo.get(id).await?)
    }

    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<ServiceConfig>> {
        let rows = self.repo.list_for_project(project_id).await?;
        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            match ServiceConfig::from_db_model(&row) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(
                    config_id = %row.id,
                    kind = %row.kind,
                    "Skipping unreadable service config: {}",
                    e
                ),
            }
        }
        Ok(configs)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        info!(config_id = %id, "Service config deleted");
        Ok(())
    }

    /// Deliver a synthetic event to one configuration and record the outcome
    /// like any other delivery.
    ///
    /// Runs regardless of `enabled` and `only_new_issues`.
    pub async fn send_test(&self, id: &str, project_name: Option<String>) -> Result<DispatchOutcome> {
        let config = self.get(id).await?;
        let permalink = format!("{}/issues/{}/", self.public_url, config.project_id);
        let event = IssueEvent::test_event(config.project_id.clone(), non_blank(project_name), permalink);

        info!(config_id = %config.id, kind = %config.kind(), "Sending test notification");
        Ok(self.dispatcher.deliver(&config, &event).await)
    }

    /// Reset failure state without a delivery.
    pub async fn clear_failure(&self, id: &str) -> Result<ServiceConfig> {
        self.repo.get(id).await?;
        if self.repo.record_success(id).await? {
            info!(config_id = %id, "Service config failure state cleared");
        }
        self.get(id).await
    }
}
