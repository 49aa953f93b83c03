//! Microsoft Teams incoming-webhook backend.
//!
//! Posts an Adaptive Card (schema 1.4) wrapped in a `message` envelope, the
//! shape accepted by both classic connectors and Workflows webhooks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::validate::{self, string_list};
use super::{Backend, BackendKind, DeliveryReceipt, DeliveryResult, http};
use crate::Result;
use crate::domain::IssueEvent;

/// Adaptive Card text colors usable as a theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "PascalCase")]
pub enum TeamsThemeColor {
    Default,
    Accent,
    Good,
    Warning,
    #[default]
    Attention,
}

/// Microsoft Teams settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamsSettings {
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_label: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub mention_emails: Vec<String>,
    #[serde(default)]
    pub theme_color: TeamsThemeColor,
}

pub struct TeamsBackend {
    client: Client,
}

impl TeamsBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn mention_entities(settings: &TeamsSettings) -> Vec<Value> {
        settings
            .mention_emails
            .iter()
            .map(|email| {
                json!({
                    "type": "mention",
                    "text": format!("<at>{}</at>", email),
                    "mentioned": { "id": email, "name": email },
                })
            })
            .collect()
    }

    pub(crate) fn build_payload(event: &IssueEvent, settings: &TeamsSettings) -> Value {
        let subtitle = match &settings.channel_label {
            Some(label) => format!("{} · {} · {}", event.trigger.description(), event.project_label(), label),
            None => format!("{} · {}", event.trigger.description(), event.project_label()),
        };

        let mut facts = vec![
            json!({ "title": "Culprit", "value": event.culprit_or_unknown() }),
            json!({ "title": "Times seen", "value": event.times_seen.to_string() }),
            json!({ "title": "First seen", "value": event.first_seen_at.to_rfc3339() }),
        ];
        if let Some(reason) = &event.unmute_reason {
            facts.push(json!({ "title": "Unmute reason", "value": reason }));
        }
        facts.push(json!({ "title": "Link", "value": event.permalink }));

        let mut body = vec![
            json!({
                "type": "TextBlock",
                "text": event.title,
                "size": "Large",
                "weight": "Bolder",
                "color": settings.theme_color.to_string(),
                "wrap": true,
            }),
            json!({
                "type": "TextBlock",
                "text": subtitle,
                "isSubtle": true,
                "spacing": "None",
                "wrap": true,
            }),
            json!({ "type": "FactSet", "facts": facts }),
        ];

        if !settings.mention_emails.is_empty() {
            let mentions: Vec<String> = settings
                .mention_emails
                .iter()
                .map(|email| format!("<at>{}</at>", email))
                .collect();
            body.push(json!({
                "type": "TextBlock",
                "text": format!("cc {}", mentions.join(" ")),
                "wrap": true,
            }));
        }

        json!({
            "type": "message",
            "attachments": [{
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": body,
                    "actions": [{
                        "type": "Action.OpenUrl",
                        "title": "View in Bugsink",
                        "url": event.permalink,
                    }],
                    "msteams": {
                        "width": "Full",
                        "entities": Self::mention_entities(settings),
                    },
                },
            }],
        })
    }
}

#[async_trait]
impl Backend for TeamsBackend {
    type Settings = TeamsSettings;

    fn kind(&self) -> BackendKind {
        BackendKind::MicrosoftTeams
    }

    fn validate_settings(&self, raw: Value) -> Result<TeamsSettings> {
        let mut settings: TeamsSettings = validate::parse_settings(self.kind(), raw)?;

        settings.webhook_url = validate::http_url("webhook_url", &settings.webhook_url, true)?;
        settings.channel_label = validate::non_blank(settings.channel_label);
        for email in &settings.mention_emails {
            validate::email("mention_emails", email)?;
        }

        Ok(settings)
    }

    async fn deliver(&self, event: &IssueEvent, settings: &TeamsSettings) -> DeliveryResult {
        let payload = Self::build_payload(event, settings);
        // Incoming webhooks answer with a bare "1" or an empty 202; no id to read.
        http::send(self.client.post(&settings.webhook_url).json(&payload)).await?;
        Ok(DeliveryReceipt::accepted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> TeamsBackend {
        TeamsBackend::new(http::test_client())
    }

    #[test]
    fn test_validate_settings() {
        let settings = backend()
            .validate_settings(json!({
                "webhook_url": "https://acme.webhook.office.com/webhookb2/abc",
                "channel_label": "  ",
                "mention_emails": "a@acme.io, b@acme.io",
            }))
            .unwrap();
        assert_eq!(settings.channel_label, None);
        assert_eq!(settings.mention_emails.len(), 2);
        assert_eq!(settings.theme_color, TeamsThemeColor::Attention);

        assert!(
            backend()
                .validate_settings(json!({"webhook_url": "http://insecure.example.com"}))
                .is_err()
        );
        assert!(
            backend()
                .validate_settings(json!({
                    "webhook_url": "https://acme.webhook.office.com/x",
                    "mention_emails": "not-an-email",
                }))
                .is_err()
        );
        assert!(
            backend()
                .validate_settings(json!({
                    "webhook_url": "https://acme.webhook.office.com/x",
                    "theme_color": "purple",
                }))
                .is_err()
        );
    }

    #[test]
    fn test_card_payload() {
        let event = IssueEvent::test_event("p1", Some("Shop".to_string()), "https://bugsink/i/9");
        let settings = TeamsSettings {
            webhook_url: "https://acme.webhook.office.com/x".to_string(),
            channel_label: Some("#alerts".to_string()),
            mention_emails: vec!["oncall@acme.io".to_string()],
            theme_color: TeamsThemeColor::Warning,
        };
        let payload = TeamsBackend::build_payload(&event, &settings);

        assert_eq!(payload["type"], "message");
        let card = &payload["attachments"][0]["content"];
        assert_eq!(card["type"], "AdaptiveCard");
        assert_eq!(card["body"][0]["text"], event.title.as_str());
        assert_eq!(card["body"][0]["color"], "Warning");
        assert_eq!(card["actions"][0]["url"], "https://bugsink/i/9");
        assert_eq!(card["msteams"]["entities"][0]["text"], "<at>oncall@acme.io</at>");
        assert!(card["body"][1]["text"].as_str().unwrap().contains("#alerts"));
        assert!(payload.to_string().contains("https://bugsink/i/9"));
    }
}
