//! Generic webhook backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::validate;
use super::{Backend, BackendKind, DeliveryReceipt, DeliveryResult, http};
use crate::domain::IssueEvent;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl WebhookMethod {
    fn as_method(&self) -> Method {
        match self {
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
        }
    }
}

/// Generic webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    #[serde(default)]
    pub method: WebhookMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_header_value: Option<String>,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Send the whole event instead of the summary object.
    #[serde(default)]
    pub full_payload: bool,
}

impl WebhookSettings {
    fn header_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        let secret = match (&self.secret_header_name, &self.secret_header_value) {
            (Some(name), Some(value)) => Some((name.as_str(), value.as_str())),
            _ => None,
        };
        self.extra_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(secret)
    }

    fn check_headers(&self) -> std::result::Result<(), String> {
        for (name, value) in self.header_pairs() {
            parse_header(name, value)?;
        }
        Ok(())
    }

    /// Outgoing headers. Entries that do not parse are left out; save-time
    /// validation rejects them, so only a hand-edited row can contain one.
    fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in self.header_pairs() {
            match parse_header(name, value) {
                Ok((name, value)) => {
                    headers.insert(name, value);
                }
                Err(e) => warn!("Skipping stored webhook header: {}", e),
            }
        }
        headers
    }
}

fn parse_header(name: &str, value: &str) -> std::result::Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| format!("invalid header name '{}': {}", name, e))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| format!("invalid value for header '{}': {}", name, e))?;
    Ok((header_name, header_value))
}

pub struct WebhookBackend {
    client: Client,
}

impl WebhookBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub(crate) fn build_payload(event: &IssueEvent, settings: &WebhookSettings) -> Value {
        if settings.full_payload {
            return json!(event);
        }

        json!({
            "event": format!("issue.{}", event.trigger),
            "trigger": event.trigger,
            "project_id": event.project_id,
            "issue_id": event.issue_id,
            "title": event.title,
            "culprit": event.culprit,
            "permalink": event.permalink,
            "times_seen": event.times_seen,
        })
    }
}

#[async_trait]
impl Backend for WebhookBackend {
    type Settings = WebhookSettings;

    fn kind(&self) -> BackendKind {
        BackendKind::Webhook
    }

    fn validate_settings(&self, raw: Value) -> Result<WebhookSettings> {
        let mut settings: WebhookSettings = validate::parse_settings(self.kind(), raw)?;

        settings.url = validate::http_url("url", &settings.url, false)?;
        settings.secret_header_name = validate::non_blank(settings.secret_header_name);
        settings.secret_header_value = validate::non_blank(settings.secret_header_value);
        if settings.secret_header_name.is_some() != settings.secret_header_value.is_some() {
            return Err(Error::validation(
                "secret_header_name and secret_header_value must be set together",
            ));
        }

        settings.check_headers().map_err(Error::validation)?;

        Ok(settings)
    }

    async fn deliver(&self, event: &IssueEvent, settings: &WebhookSettings) -> DeliveryResult {
        let payload = Self::build_payload(event, settings);

        let request = self
            .client
            .request(settings.method.as_method(), &settings.url)
            .headers(settings.header_map())
            .json(&payload);

        http::send(request).await?;
        Ok(DeliveryReceipt::accepted())
    }
}
