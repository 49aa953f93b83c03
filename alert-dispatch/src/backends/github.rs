//! GitHub Issues backend.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::validate::{self, string_list};
use super::{Backend, BackendKind, DeliveryReceipt, DeliveryResult, http};
use crate::domain::IssueEvent;
use crate::{Error, Result};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const MAX_TITLE_CHARS: usize = 256;

static REPOSITORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*)/[A-Za-z0-9._-]+$").unwrap());

/// GitHub Issues settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// `owner/repo`.
    pub repository: String,
    pub access_token: String,
    #[serde(default, deserialize_with = "string_list")]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub assignees: Vec<String>,
}

impl GitHubSettings {
    fn owner_and_repo(&self) -> (&str, &str) {
        self.repository
            .split_once('/')
            .unwrap_or((self.repository.as_str(), ""))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
    #[serde(default)]
    html_url: Option<String>,
}

pub struct GitHubIssuesBackend {
    client: Client,
    api_url: String,
}

impl GitHubIssuesBackend {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn build_body(event: &IssueEvent) -> String {
        let mut lines = vec![
            "## Error Details".to_string(),
            String::new(),
            format!("**Title:** {}", event.title),
            format!("**Culprit:** `{}`", event.culprit_or_unknown()),
            String::new(),
            "## Timeline".to_string(),
            String::new(),
            "| First Seen | Times Seen |".to_string(),
            "|------------|------------|".to_string(),
            format!(
                "| {} | {} |",
                event.first_seen_at.to_rfc3339(),
                event.times_seen
            ),
            String::new(),
            "## Context".to_string(),
            String::new(),
            format!("- **Project:** {}", event.project_label()),
            format!("- **Trigger:** {}", event.trigger.description()),
        ];

        if let Some(reason) = &event.unmute_reason {
            lines.push(format!("- **Unmute Reason:** {}", reason));
        }

        lines.push(format!("- **Details:** [View in Bugsink]({})", event.permalink));
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(
            "*This issue was automatically created by [Bugsink](https://bugsink.com)*".to_string(),
        );
        lines.join("\n")
    }

    pub(crate) fn build_payload(event: &IssueEvent, settings: &GitHubSettings) -> serde_json::Value {
        let mut payload = json!({
            "title": http::truncate_chars(&event.title, MAX_TITLE_CHARS),
            "body": Self::build_body(event),
        });

        if !settings.labels.is_empty() {
            payload["labels"] = json!(settings.labels);
        }
        if !settings.assignees.is_empty() {
            payload["assignees"] = json!(settings.assignees);
        }

        payload
    }
}

#[async_trait]
impl Backend for GitHubIssuesBackend {
    type Settings = GitHubSettings;

    fn kind(&self) -> BackendKind {
        BackendKind::GithubIssues
    }

    fn validate_settings(&self, raw: serde_json::Value) -> Result<GitHubSettings> {
        let mut settings: GitHubSettings = validate::parse_settings(self.kind(), raw)?;

        settings.repository = settings.repository.trim().to_string();
        validate::require_non_empty("repository", &settings.repository)?;
        if !REPOSITORY_REGEX.is_match(&settings.repository) {
            return Err(Error::validation(format!(
                "repository must be in the form 'owner/repo' (got '{}')",
                settings.repository
            )));
        }

        settings.access_token = settings.access_token.trim().to_string();
        validate::require_non_empty("access_token", &settings.access_token)?;

        Ok(settings)
    }

    async fn deliver(&self, event: &IssueEvent, settings: &GitHubSettings) -> DeliveryResult {
        let (owner, repo) = settings.owner_and_repo();
        let url = format!("{}/repos/{}/{}/issues", self.api_url, owner, repo);
        let payload = Self::build_payload(event, settings);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&settings.access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&payload);

        let response = http::send(request).await?;
        let created: CreatedIssue = http::read_json(response).await?;

        debug!(
            repository = %settings.repository,
            number = created.number,
            "GitHub issue created"
        );

        let receipt = DeliveryReceipt::with_id(format!("#{}", created.number));
        Ok(match created.html_url {
            Some(url) => receipt.with_url(url),
            None => receipt,
        })
    }
}
