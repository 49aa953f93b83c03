//! Jira Cloud backend.
//!
//! Creates one issue per event through `POST /rest/api/2/issue`, authenticated
//! with HTTP basic auth (account email + API token). The v2 endpoint takes a
//! plain wiki-markup description.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::validate::{self, string_list};
use super::{Backend, BackendKind, DeliveryError, DeliveryReceipt, DeliveryResult, http};
use crate::Result;
use crate::domain::IssueEvent;

/// Jira rejects summaries longer than this.
const MAX_SUMMARY_CHARS: usize = 255;
const MAX_PROJECT_KEY_CHARS: usize = 20;

/// Standard Jira Cloud issue types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum JiraIssueType {
    #[default]
    Bug,
    Task,
    Story,
    Epic,
    #[serde(rename = "Sub-task")]
    #[strum(serialize = "Sub-task")]
    SubTask,
    Improvement,
    #[serde(rename = "New Feature")]
    #[strum(serialize = "New Feature")]
    NewFeature,
}

/// Jira Cloud settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraSettings {
    /// Site URL, e.g. `https://your-domain.atlassian.net`.
    #[serde(alias = "jira_url")]
    pub base_url: String,
    pub user_email: String,
    pub api_token: String,
    pub project_key: String,
    #[serde(default)]
    pub issue_type: JiraIssueType,
    #[serde(default, deserialize_with = "string_list")]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

pub struct JiraCloudBackend {
    client: Client,
}

impl JiraCloudBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build_description(event: &IssueEvent) -> String {
        let mut lines = vec![
            format!("*Trigger:* {}", event.trigger.description()),
            format!("*Culprit:* {}", event.culprit_or_unknown()),
            String::new(),
            format!("*First Seen:* {}", event.first_seen_at.to_rfc3339()),
            format!("*Times Seen:* {}", event.times_seen),
            String::new(),
            format!("*Project:* {}", event.project_label()),
        ];

        if let Some(reason) = &event.unmute_reason {
            lines.push(format!("*Unmute Reason:* {}", reason));
        }

        lines.push(String::new());
        lines.push(format!("[View in Bugsink|{}]", event.permalink));
        lines.join("\n")
    }

    pub(crate) fn build_payload(event: &IssueEvent, settings: &JiraSettings) -> serde_json::Value {
        let mut payload = json!({
            "fields": {
                "project": { "key": settings.project_key },
                "summary": http::truncate_chars(&event.title, MAX_SUMMARY_CHARS),
                "description": Self::build_description(event),
                "issuetype": { "name": settings.issue_type.to_string() },
            }
        });

        if !settings.labels.is_empty() {
            payload["fields"]["labels"] = json!(settings.labels);
        }

        payload
    }
}

#[async_trait]
impl Backend for JiraCloudBackend {
    type Settings = JiraSettings;

    fn kind(&self) -> BackendKind {
        BackendKind::JiraCloud
    }

    fn validate_settings(&self, raw: serde_json::Value) -> Result<JiraSettings> {
        let mut settings: JiraSettings = validate::parse_settings(self.kind(), raw)?;

        settings.base_url = validate::http_url("base_url", &settings.base_url, true)?
            .trim_end_matches('/')
            .to_string();
        validate::email("user_email", &settings.user_email)?;
        settings.user_email = settings.user_email.trim().to_string();
        validate::require_non_empty("api_token", &settings.api_token)?;

        settings.project_key = settings.project_key.trim().to_string();
        validate::require_non_empty("project_key", &settings.project_key)?;
        if settings.project_key.chars().count() > MAX_PROJECT_KEY_CHARS
            || settings.project_key.contains(char::is_whitespace)
        {
            return Err(crate::Error::validation(format!(
                "project_key must be at most {} characters without spaces",
                MAX_PROJECT_KEY_CHARS
            )));
        }

        Ok(settings)
    }

    async fn deliver(&self, event: &IssueEvent, settings: &JiraSettings) -> DeliveryResult {
        let url = format!("{}/rest/api/2/issue", settings.base_url);
        let payload = Self::build_payload(event, settings);

        let request = self
            .client
            .post(&url)
            .basic_auth(&settings.user_email, Some(&settings.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload);

        let response = http::send(request).await?;
        let status = response.status().as_u16();
        let created: CreatedIssue = http::read_json(response).await?;
        if created.key.is_empty() {
            return Err(
                DeliveryError::response_parse("Jira response did not include an issue key")
                    .with_status(status),
            );
        }

        debug!(issue_key = %created.key, jira_id = %created.id, "Jira issue created");
        Ok(DeliveryReceipt::with_id(&created.key)
            .with_url(format!("{}/browse/{}", settings.base_url, created.key)))
    }
}
