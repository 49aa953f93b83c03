//! Dispatch-time error taxonomy.

use serde::{Deserialize, Serialize};

/// Tag stored in `last_failure_kind`.
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
pub enum ErrorKind {
    /// Connect failure or timeout; no response was received.
    NetworkError,
    /// The remote side answered with a non-2xx status.
    HttpError,
    /// A 2xx response whose body did not confirm the creation.
    ResponseParseError,
    /// Settings rejected at save time.
    ValidationError,
    /// Registry miss for a stored kind.
    UnknownBackend,
}

/// Failure of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DeliveryError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    /// Raw response body, already truncated.
    pub body: Option<String>,
    /// Whether `body` parses as JSON.
    pub body_is_structured: bool,
}

impl DeliveryError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            body: None,
            body_is_structured: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn http(status: u16, reason: Option<&str>, body: Option<String>) -> Self {
        let message = match reason {
            Some(reason) => format!("Status {}: {}", status, reason),
            None => format!("Status {}", status),
        };
        Self::new(ErrorKind::HttpError, message)
            .with_status(status)
            .with_body(body)
    }

    pub fn response_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResponseParseError, message)
    }

    pub fn unknown_backend(kind: &str) -> Self {
        Self::new(
            ErrorKind::UnknownBackend,
            format!("No backend registered for kind '{}'", kind),
        )
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach a response body, truncating it and detecting JSON.
    pub fn with_body(mut self, body: Option<String>) -> Self {
        match body {
            Some(body) if !body.is_empty() => {
                self.body_is_structured = super::http::is_structured(&body);
                self.body = Some(super::http::truncate_chars(
                    &body,
                    super::http::MAX_FAILURE_BODY_CHARS,
                ));
            }
            _ => {
                self.body = None;
                self.body_is_structured = false;
            }
        }
        self
    }
}
