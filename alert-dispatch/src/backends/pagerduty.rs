//! PagerDuty Events API v2 backend.
//!
//! Every event is sent as a `trigger` with `dedup_key = issue_id`, so repeated
//! triggers for the same issue fold into one incident on PagerDuty's side.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::validate;
use super::{Backend, BackendKind, DeliveryError, DeliveryReceipt, DeliveryResult, http};
use crate::domain::IssueEvent;
use crate::{Error, Result};

pub const DEFAULT_PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";
const ROUTING_KEY_LEN: usize = 32;
const MAX_SUMMARY_CHARS: usize = 1024;
const DEFAULT_SOURCE: &str = "bugsink";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PagerDutySeverity {
    Critical,
    #[default]
    Error,
    Warning,
    Info,
}

/// PagerDuty settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagerDutySettings {
    /// Integration key of an Events API v2 integration.
    pub routing_key: String,
    #[serde(default)]
    pub default_severity: PagerDutySeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default = "default_include_link")]
    pub include_link: bool,
}

fn default_include_link() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct EnqueueResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    dedup_key: Option<String>,
}

pub struct PagerDutyBackend {
    client: Client,
    events_url: String,
}

impl PagerDutyBackend {
    pub fn new(client: Client, events_url: impl Into<String>) -> Self {
        Self {
            client,
            events_url: events_url.into(),
        }
    }

    pub(crate) fn build_payload(event: &IssueEvent, settings: &PagerDutySettings) -> Value {
        let mut custom_details = json!({
            "permalink": event.permalink,
            "trigger": event.trigger.description(),
            "culprit": event.culprit_or_unknown(),
            "times_seen": event.times_seen,
            "first_seen": event.first_seen_at.to_rfc3339(),
            "project": event.project_label(),
        });
        if let Some(reason) = &event.unmute_reason {
            custom_details["unmute_reason"] = json!(reason);
        }

        let mut payload = json!({
            "routing_key": settings.routing_key,
            "event_action": "trigger",
            "dedup_key": event.issue_id,
            "client": "Bugsink",
            "payload": {
                "summary": http::truncate_chars(&event.title, MAX_SUMMARY_CHARS),
                "source": settings.service_name.as_deref().unwrap_or(DEFAULT_SOURCE),
                "severity": settings.default_severity.to_string(),
                "timestamp": event.first_seen_at.to_rfc3339(),
                "component": event.culprit_or_unknown(),
                "group": event.project_id,
                "class": event.trigger.to_string(),
                "custom_details": custom_details,
            },
        });

        if settings.include_link {
            payload["client_url"] = json!(event.permalink);
            payload["links"] = json!([{ "href": event.permalink, "text": "View in Bugsink" }]);
        }

        payload
    }
}

#[async_trait]
impl Backend for PagerDutyBackend {
    type Settings = PagerDutySettings;

    fn kind(&self) -> BackendKind {
        BackendKind::PagerDuty
    }

    fn validate_settings(&self, raw: Value) -> Result<PagerDutySettings> {
        let mut settings: PagerDutySettings = validate::parse_settings(self.kind(), raw)?;

        settings.routing_key = settings.routing_key.trim().to_string();
        if settings.routing_key.len() != ROUTING_KEY_LEN
            || !settings.routing_key.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::validation(format!(
                "routing_key must be {} alphanumeric characters",
                ROUTING_KEY_LEN
            )));
        }
        settings.service_name = validate::non_blank(settings.service_name);

        Ok(settings)
    }

    async fn deliver(&self, event: &IssueEvent, settings: &PagerDutySettings) -> DeliveryResult {
        let payload = Self::build_payload(event, settings);
        let response = http::send(self.client.post(&self.events_url).json(&payload)).await?;
        let status = response.status().as_u16();
        let ack: EnqueueResponse = http::read_json(response).await?;

        if ack.status != "success" {
            return Err(DeliveryError::response_parse(format!(
                "PagerDuty did not accept the event: {} {}",
                ack.status,
                ack.message.unwrap_or_default()
            ))
            .with_status(status));
        }

        let dedup_key = ack.dedup_key.unwrap_or_else(|| event.issue_id.clone());
        debug!(dedup_key = %dedup_key, "PagerDuty event enqueued");
        Ok(DeliveryReceipt::with_id(dedup_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> PagerDutyBackend {
        PagerDutyBackend::new(http::test_client(), DEFAULT_PAGERDUTY_EVENTS_URL)
    }

    #[test]
    fn test_validate_routing_key() {
        let settings = backend()
            .validate_settings(json!({ "routing_key": format!(" {} ", "R".repeat(32)) }))
            .unwrap();
        assert_eq!(settings.routing_key.len(), 32);
        assert_eq!(settings.default_severity, PagerDutySeverity::Error);
        assert!(settings.include_link);

        assert!(backend().validate_settings(json!({ "routing_key": "short" })).is_err());
        assert!(
            backend()
                .validate_settings(json!({ "routing_key": format!("{}-", "a".repeat(31)) }))
                .is_err()
        );
        assert!(
            backend()
                .validate_settings(json!({
                    "routing_key": "a".repeat(32),
                    "default_severity": "fatal",
                }))
                .is_err()
        );
    }

    #[test]
    fn test_build_payload() {
        let event = IssueEvent::test_event("p7", None, "https://bugsink/i/7");
        let settings = PagerDutySettings {
            routing_key: "k".repeat(32),
            default_severity: PagerDutySeverity::Critical,
            service_name: Some("checkout".to_string()),
            include_link: true,
        };
        let payload = PagerDutyBackend::build_payload(&event, &settings);

        assert_eq!(payload["event_action"], "trigger");
        assert_eq!(payload["dedup_key"], event.issue_id.as_str());
        assert_eq!(payload["payload"]["severity"], "critical");
        assert_eq!(payload["payload"]["source"], "checkout");
        assert_eq!(payload["payload"]["summary"], event.title.as_str());
        assert_eq!(payload["links"][0]["href"], "https://bugsink/i/7");
        assert_eq!(payload["payload"]["custom_details"]["permalink"], "https://bugsink/i/7");
    }

    #[test]
    fn test_link_omitted_when_disabled() {
        let event = IssueEvent::test_event("p7", None, "https://bugsink/i/7");
        let settings = PagerDutySettings {
            routing_key: "k".repeat(32),
            default_severity: PagerDutySeverity::Info,
            service_name: None,
            include_link: false,
        };
        let payload = PagerDutyBackend::build_payload(&event, &settings);

        assert!(payload.get("links").is_none());
        assert!(payload.get("client_url").is_none());
        assert_eq!(payload["payload"]["source"], "bugsink");
        assert_eq!(payload["payload"]["custom_details"]["permalink"], "https://bugsink/i/7");
    }
}
