//! Notification backends.
//!
//! Each backend turns an [`IssueEvent`] into exactly one outbound request to a
//! third-party system:
//! - Jira Cloud (REST v2 issue creation)
//! - GitHub Issues (REST issue creation)
//! - Microsoft Teams (incoming-webhook Adaptive Card)
//! - PagerDuty (Events API v2)
//! - Generic webhook
//!
//! Settings are validated once, when a configuration is saved, into one of the
//! typed structs wrapped by [`BackendSettings`]. Delivery only ever sees the
//! typed form.

mod error;
mod github;
pub mod http;
mod jira;
mod pagerduty;
mod registry;
mod teams;
pub mod validate;
mod webhook;

pub use error::{DeliveryError, ErrorKind};
pub use github::{GitHubIssuesBackend, GitHubSettings};
pub use http::HttpClientConfig;
pub use jira::{JiraCloudBackend, JiraIssueType, JiraSettings};
pub use pagerduty::{PagerDutyBackend, PagerDutySettings, PagerDutySeverity};
pub use registry::{BackendEndpoints, BackendInfo, BackendRegistry};
pub use teams::{TeamsBackend, TeamsSettings, TeamsThemeColor};
pub use webhook::{WebhookBackend, WebhookMethod, WebhookSettings};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::IssueEvent;

/// Placeholder shown by the API instead of stored credentials.
pub const REDACTED: &str = "********";

/// Result of a single delivery.
pub type DeliveryResult = std::result::Result<DeliveryReceipt, DeliveryError>;

/// Backend identifiers as stored in `service_config.kind`.
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
pub enum BackendKind {
    JiraCloud,
    GithubIssues,
    MicrosoftTeams,
    #[serde(rename = "pagerduty")]
    #[strum(serialize = "pagerduty")]
    PagerDuty,
    Webhook,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::JiraCloud,
        BackendKind::GithubIssues,
        BackendKind::MicrosoftTeams,
        BackendKind::PagerDuty,
        BackendKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Settings fields that hold credentials.
    pub fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            Self::JiraCloud => &["api_token"],
            Self::GithubIssues => &["access_token"],
            Self::MicrosoftTeams => &[],
            Self::PagerDuty => &["routing_key"],
            Self::Webhook => &["secret_header_value"],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::JiraCloud => "Jira Cloud",
            Self::GithubIssues => "GitHub Issues",
            Self::MicrosoftTeams => "Microsoft Teams",
            Self::PagerDuty => "PagerDuty",
            Self::Webhook => "Webhook",
        }
    }
}

/// Typed settings, one variant per backend kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "settings", rename_all = "snake_case")]
pub enum BackendSettings {
    JiraCloud(JiraSettings),
    GithubIssues(GitHubSettings),
    MicrosoftTeams(TeamsSettings),
    #[serde(rename = "pagerduty")]
    PagerDuty(PagerDutySettings),
    Webhook(WebhookSettings),
}

impl BackendSettings {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::JiraCloud(_) => BackendKind::JiraCloud,
            Self::GithubIssues(_) => BackendKind::GithubIssues,
            Self::MicrosoftTeams(_) => BackendKind::MicrosoftTeams,
            Self::PagerDuty(_) => BackendKind::PagerDuty,
            Self::Webhook(_) => BackendKind::Webhook,
        }
    }

    /// Serialize the inner settings struct for storage.
    pub fn to_stored(&self) -> Result<String> {
        let json = match self {
            Self::JiraCloud(s) => serde_json::to_string(s)?,
            Self::GithubIssues(s) => serde_json::to_string(s)?,
            Self::MicrosoftTeams(s) => serde_json::to_string(s)?,
            Self::PagerDuty(s) => serde_json::to_string(s)?,
            Self::Webhook(s) => serde_json::to_string(s)?,
        };
        Ok(json)
    }

    /// Copy with every credential replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        match &mut settings {
            Self::JiraCloud(s) => s.api_token = REDACTED.to_string(),
            Self::GithubIssues(s) => s.access_token = REDACTED.to_string(),
            Self::MicrosoftTeams(_) => {}
            Self::PagerDuty(s) => s.routing_key = REDACTED.to_string(),
            Self::Webhook(s) => {
                if s.secret_header_value.is_some() {
                    s.secret_header_value = Some(REDACTED.to_string());
                }
            }
        }
        settings
    }

    /// Put these settings' credentials back into `raw` wherever it still
    /// carries the [`REDACTED`] placeholder.
    pub fn restore_secrets(&self, raw: &mut serde_json::Value) -> Result<()> {
        let Some(fields) = raw.as_object_mut() else {
            return Ok(());
        };
        let stored: serde_json::Value = serde_json::from_str(&self.to_stored()?)?;

        for name in self.kind().secret_fields() {
            if fields.get(*name).and_then(serde_json::Value::as_str) == Some(REDACTED)
                && let Some(value) = stored.get(*name)
            {
                fields.insert((*name).to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Decode settings previously produced by [`Self::to_stored`].
    ///
    /// This only deserializes; validation already happened at save time.
    pub fn from_stored(kind: BackendKind, stored: &str) -> Result<Self> {
        fn decode<T: DeserializeOwned>(stored: &str) -> Result<T> {
            Ok(serde_json::from_str(stored)?)
        }

        Ok(match kind {
            BackendKind::JiraCloud => Self::JiraCloud(decode(stored)?),
            BackendKind::GithubIssues => Self::GithubIssues(decode(stored)?),
            BackendKind::MicrosoftTeams => Self::MicrosoftTeams(decode(stored)?),
            BackendKind::PagerDuty => Self::PagerDuty(decode(stored)?),
            BackendKind::Webhook => Self::Webhook(decode(stored)?),
        })
    }
}

/// Acknowledgement of a successful delivery. Only used for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Identifier assigned by the remote system (issue key, number, dedup key).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Link to the created object, when the remote system returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DeliveryReceipt {
    pub fn accepted() -> Self {
        Self::default()
    }

    pub fn with_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A notification target.
///
/// Implementations perform one outbound call per `deliver` and never retry.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Typed settings for this backend.
    type Settings: Serialize + DeserializeOwned + Send + Sync;

    fn kind(&self) -> BackendKind;

    /// Validate raw settings from the configuration layer.
    fn validate_settings(&self, raw: serde_json::Value) -> Result<Self::Settings>;

    /// Deliver one notification.
    async fn deliver(&self, event: &IssueEvent, settings: &Self::Settings) -> DeliveryResult;
}
