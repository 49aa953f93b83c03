//! Service configuration database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// A row of `service_config`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceConfigDbModel {
    pub id: String,
    pub project_id: String,
    /// Backend identifier. Write-once.
    pub kind: String,
    pub display_name: String,
    pub enabled: bool,
    /// Serialized settings struct for `kind`.
    pub settings: String,
    pub only_new_issues: bool,
    pub last_failure_at: Option<i64>,
    pub last_failure_kind: Option<String>,
    pub last_failure_message: Option<String>,
    pub last_failure_status_code: Option<i64>,
    pub last_failure_body: Option<String>,
    pub last_failure_body_is_structured: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ServiceConfigDbModel {
    pub fn new(
        project_id: impl Into<String>,
        kind: impl Into<String>,
        display_name: impl Into<String>,
        settings: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            kind: kind.into(),
            display_name: display_name.into(),
            enabled: true,
            settings: settings.into(),
            only_new_issues: false,
            last_failure_at: None,
            last_failure_kind: None,
            last_failure_message: None,
            last_failure_status_code: None,
            last_failure_body: None,
            last_failure_body_is_structured: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_failing(&self) -> bool {
        self.last_failure_at.is_some()
    }
}
