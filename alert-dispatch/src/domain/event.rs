//! Issue events handed to the dispatcher by the ingestion side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an issue is being notified about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    New,
    Regression,
    Unmuted,
}

impl Trigger {
    pub fn description(&self) -> &'static str {
        match self {
            Self::New => "New issue",
            Self::Regression => "Regression",
            Self::Unmuted => "Unmuted",
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }

    /// Whether a configuration with the given `only_new_issues` flag should
    /// hear about this trigger.
    pub fn is_allowed(&self, only_new_issues: bool) -> bool {
        !only_new_issues || self.is_new()
    }
}

/// One qualifying occurrence of an issue. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEvent {
    pub project_id: String,
    pub issue_id: String,
    pub trigger: Trigger,
    pub title: String,
    #[serde(default)]
    pub culprit: Option<String>,
    /// Link to the issue in the tracker UI.
    pub permalink: String,
    pub first_seen_at: DateTime<Utc>,
    pub times_seen: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Set for `Unmuted` events when the unmute condition is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmute_reason: Option<String>,
}

impl IssueEvent {
    /// Project name when known, otherwise the project id.
    pub fn project_label(&self) -> &str {
        self.project_name.as_deref().unwrap_or(&self.project_id)
    }

    pub fn culprit_or_unknown(&self) -> &str {
        match self.culprit.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => "Unknown",
        }
    }

    /// Synthetic event used by "send test notification".
    pub fn test_event(
        project_id: impl Into<String>,
        project_name: Option<String>,
        permalink: impl Into<String>,
    ) -> Self {
        let project_id = project_id.into();
        let label = project_name.clone().unwrap_or_else(|| project_id.clone());
        Self {
            project_id,
            issue_id: uuid::Uuid::new_v4().to_string(),
            trigger: Trigger::New,
            title: format!("[Bugsink] Test Issue - {}", label),
            culprit: Some("alert_dispatch.test_notification".to_string()),
            permalink: permalink.into(),
            first_seen_at: Utc::now(),
            times_seen: 1,
            project_name,
            unmute_reason: None,
        }
    }
}
