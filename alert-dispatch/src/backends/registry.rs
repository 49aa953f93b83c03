//! Static backend registry.
//!
//! The set of backends is closed: every [`BackendKind`] maps to exactly one
//! implementation held here, and dispatch is a `match` over
//! [`BackendSettings`].

use std::str::FromStr;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::github::DEFAULT_GITHUB_API_URL;
use super::pagerduty::DEFAULT_PAGERDUTY_EVENTS_URL;
use super::{
    Backend, BackendKind, BackendSettings, DeliveryError, DeliveryResult, GitHubIssuesBackend,
    HttpClientConfig, JiraCloudBackend, PagerDutyBackend, TeamsBackend, WebhookBackend, http,
};
use crate::domain::IssueEvent;
use crate::{Error, Result};

/// Base URLs of fixed third-party APIs. Overridable for self-hosted setups
/// and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoints {
    pub github_api_url: String,
    pub pagerduty_events_url: String,
}

impl Default for BackendEndpoints {
    fn default() -> Self {
        Self {
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            pagerduty_events_url: DEFAULT_PAGERDUTY_EVENTS_URL.to_string(),
        }
    }
}

/// Public description of a registered backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub display_name: &'static str,
}

pub struct BackendRegistry {
    jira: JiraCloudBackend,
    github: GitHubIssuesBackend,
    teams: TeamsBackend,
    pagerduty: PagerDutyBackend,
    webhook: WebhookBackend,
}

impl BackendRegistry {
    pub fn new(http_config: &HttpClientConfig, endpoints: &BackendEndpoints) -> Result<Self> {
        let client = http::build_client(http_config)?;
        Ok(Self::with_client(client, endpoints))
    }

    /// Build a registry sharing an existing client.
    pub fn with_client(client: Client, endpoints: &BackendEndpoints) -> Self {
        Self {
            jira: JiraCloudBackend::new(client.clone()),
            github: GitHubIssuesBackend::new(client.clone(), endpoints.github_api_url.clone()),
            teams: TeamsBackend::new(client.clone()),
            pagerduty: PagerDutyBackend::new(client.clone(), endpoints.pagerduty_events_url.clone()),
            webhook: WebhookBackend::new(client),
        }
    }

    pub fn backends(&self) -> Vec<BackendInfo> {
        BackendKind::ALL
            .iter()
            .map(|kind| BackendInfo {
                kind: *kind,
                display_name: kind.display_name(),
            })
            .collect()
    }

    /// Look up a stored kind identifier.
    pub fn resolve(&self, kind: &str) -> std::result::Result<BackendKind, DeliveryError> {
        BackendKind::from_str(kind).map_err(|_| DeliveryError::unknown_backend(kind))
    }

    /// Validate raw settings for `kind` into their typed form.
    pub fn validate_settings(&self, kind: &str, raw: serde_json::Value) -> Result<BackendSettings> {
        let kind = BackendKind::from_str(kind).map_err(|_| Error::UnknownBackend(kind.to_string()))?;

        Ok(match kind {
            BackendKind::JiraCloud => BackendSettings::JiraCloud(self.jira.validate_settings(raw)?),
            BackendKind::GithubIssues => {
                BackendSettings::GithubIssues(self.github.validate_settings(raw)?)
            }
            BackendKind::MicrosoftTeams => {
                BackendSettings::MicrosoftTeams(self.teams.validate_settings(raw)?)
            }
            BackendKind::PagerDuty => {
                BackendSettings::PagerDuty(self.pagerduty.validate_settings(raw)?)
            }
            BackendKind::Webhook => BackendSettings::Webhook(self.webhook.validate_settings(raw)?),
        })
    }

    /// Deliver an event to the backend matching `settings`.
    pub async fn deliver(&self, event: &IssueEvent, settings: &BackendSettings) -> DeliveryResult {
        match settings {
            BackendSettings::JiraCloud(s) => self.jira.deliver(event, s).await,
            BackendSettings::GithubIssues(s) => self.github.deliver(event, s).await,
            BackendSettings::MicrosoftTeams(s) => self.teams.deliver(event, s).await,
            BackendSettings::PagerDuty(s) => self.pagerduty.deliver(event, s).await,
            BackendSettings::Webhook(s) => self.webhook.deliver(event, s).await,
        }
    }
}
