//! Shared outbound HTTP plumbing for all backends.
//!
//! Every backend performs exactly one request per delivery through [`send`];
//! nothing in here retries.

use std::sync::OnceLock;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::DeliveryError;

/// Response bodies stored in failure state are cut to this many characters.
pub const MAX_FAILURE_BODY_CHARS: usize = 1000;

/// Bytes read from a non-2xx response before it is dropped.
const MAX_ERROR_BODY_BYTES: usize = 4096;

const USER_AGENT: &str = concat!("alert-dispatch/", env!("CARGO_PKG_VERSION"));

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 5,
            connect_timeout_secs: 3,
        }
    }
}

impl HttpClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client shared by every backend.
pub fn build_client(config: &HttpClientConfig) -> crate::Result<Client> {
    install_rustls_provider();

    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| crate::Error::config(format!("Failed to build HTTP client: {}", e)))
}

fn classify_transport_error(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::network(format!("Request timed out: {}", err))
    } else if err.is_connect() {
        DeliveryError::network(format!("Connection failed: {}", err))
    } else {
        DeliveryError::network(format!("Request failed: {}", err))
    }
}

#[cfg(test)]
pub(crate) fn test_client() -> Client {
    build_client(&HttpClientConfig::default()).expect("test client")
}

/// Send a request and turn transport failures and non-2xx statuses into
/// [`DeliveryError`]s.
pub async fn send(request: RequestBuilder) -> Result<Response, DeliveryError> {
    let response = request.send().await.map_err(classify_transport_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_capped(response, MAX_ERROR_BODY_BYTES).await;
    Err(DeliveryError::http(
        status.as_u16(),
        status.canonical_reason(),
        body,
    ))
}

/// Read at most `limit` bytes of the body. `None` when nothing could be read.
async fn read_capped(response: Response, limit: usize) -> Option<String> {
    let mut buffer = Vec::with_capacity(limit.min(response.content_length().unwrap_or(0) as usize));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Failed to read error response body: {}", e);
                break;
            }
        };
        let room = limit - buffer.len();
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buffer.len() >= limit {
            break;
        }
    }

    if buffer.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&buffer).into_owned())
}

/// Decode a successful response body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, DeliveryError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            classify_transport_error(e)
        } else {
            DeliveryError::response_parse(format!("Failed to read response body: {}", e))
                .with_status(status)
        }
    })?;

    serde_json::from_str(&body).map_err(|e| {
        DeliveryError::response_parse(format!("Unexpected response body: {}", e))
            .with_status(status)
            .with_body(Some(body))
    })
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Whether a body is a JSON object or array.
pub fn is_structured(body: &str) -> bool {
    let trimmed = body.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde::de::IgnoredAny>(body).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 2), "");
    }

    #[test]
    fn test_is_structured() {
        assert!(is_structured(r#"{"errors":["bad"]}"#));
        assert!(is_structured("  [1, 2]"));
        assert!(!is_structured("\"just a string\""));
        assert!(!is_structured("<html>502</html>"));
        assert!(!is_structured("{broken"));
    }

    #[test]
    fn test_default_timeouts() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_read_capped_stops_at_limit() {
        let response = Response::from(
            axum::http::Response::builder()
                .status(502)
                .body("x".repeat(100_000))
                .unwrap(),
        );
        let body = read_capped(response, MAX_ERROR_BODY_BYTES).await.unwrap();
        assert_eq!(body.len(), MAX_ERROR_BODY_BYTES);

        let response = Response::from(axum::http::Response::builder().status(500).body("").unwrap());
        assert!(read_capped(response, MAX_ERROR_BODY_BYTES).await.is_none());
    }

    #[tokio::test]
    async fn test_large_error_body_is_truncated() {
        let router = axum::Router::new().fallback(|| async {
            (axum::http::StatusCode::BAD_GATEWAY, "e".repeat(1_000_000))
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let err = send(test_client().get(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(502));
        assert_eq!(err.body.unwrap().chars().count(), MAX_FAILURE_BODY_CHARS);
        assert!(!err.body_is_structured);
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_network_error() {
        let client = build_client(&HttpClientConfig::default()).unwrap();
        // Bind and release a port so nothing is listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = send(client.post(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, super::super::error::ErrorKind::NetworkError);
        assert!(err.status_code.is_none());
    }
}
