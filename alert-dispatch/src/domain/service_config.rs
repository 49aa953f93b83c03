//! Persisted backend bindings and their health state.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::{BackendKind, BackendSettings, DeliveryError, ErrorKind};
use crate::database::models::ServiceConfigDbModel;
use crate::database::time::ms_to_datetime;
use crate::{Error, Result};

/// Last recorded delivery failure. Present as a whole or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub at: DateTime<Utc>,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub body_is_structured: bool,
}

impl FailureInfo {
    pub fn from_error(err: &DeliveryError, at: DateTime<Utc>) -> Self {
        Self {
            at,
            kind: err.kind,
            message: err.message.clone(),
            status_code: err.status_code,
            body: err.body.clone(),
            body_is_structured: err.body.is_some() && err.body_is_structured,
        }
    }

    fn from_db_model(model: &ServiceConfigDbModel) -> Option<Self> {
        let (at, kind, message) = match (
            model.last_failure_at,
            model.last_failure_kind.as_deref(),
            model.last_failure_message.as_ref(),
        ) {
            (Some(at), Some(kind), Some(message)) => (at, kind, message),
            _ => return None,
        };

        // Tags written by a newer build degrade to the closest generic kind.
        let kind = ErrorKind::from_str(kind).unwrap_or(ErrorKind::NetworkError);

        Some(Self {
            at: ms_to_datetime(at),
            kind,
            message: message.clone(),
            status_code: model
                .last_failure_status_code
                .and_then(|code| u16::try_from(code).ok()),
            body: model.last_failure_body.clone(),
            body_is_structured: model.last_failure_body_is_structured,
        })
    }
}

/// A project's binding to one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    pub id: String,
    pub project_id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Serialized as `kind` plus `settings`.
    #[serde(flatten)]
    pub settings: BackendSettings,
    pub only_new_issues: bool,
    pub failure: Option<FailureInfo>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceConfig {
    pub fn kind(&self) -> BackendKind {
        self.settings.kind()
    }

    pub fn is_failing(&self) -> bool {
        self.failure.is_some()
    }

    /// Same configuration with credentials masked, for API responses.
    pub fn redacted(mut self) -> Self {
        self.settings = self.settings.redacted();
        self
    }

    /// Build from a stored row.
    ///
    /// Fails with [`Error::UnknownBackend`] when `kind` is not registered and
    /// with [`Error::Serialization`] when the stored settings cannot be decoded.
    pub fn from_db_model(model: &ServiceConfigDbModel) -> Result<Self> {
        let kind = BackendKind::from_str(&model.kind)
            .map_err(|_| Error::UnknownBackend(model.kind.clone()))?;
        let settings = BackendSettings::from_stored(kind, &model.settings)?;

        Ok(Self {
            id: model.id.clone(),
            project_id: model.project_id.clone(),
            display_name: model.display_name.clone(),
            enabled: model.enabled,
            settings,
            only_new_issues: model.only_new_issues,
            failure: FailureInfo::from_db_model(model),
            version: model.version,
            created_at: ms_to_datetime(model.created_at),
            updated_at: ms_to_datetime(model.updated_at),
        })
    }
}
