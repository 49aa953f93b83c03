//! Process configuration loaded from the environment.
//!
//! A `.env` file is honored when present. Every setting has a default; numeric
//! values that fail to parse fall back to it with a warning.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::backends::{BackendEndpoints, HttpClientConfig};
use crate::dispatch::DispatcherConfig;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:alert-dispatch.db?mode=rwc";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// `LOG_FILTER` directive; `RUST_LOG` still takes precedence.
    pub filter: Option<String>,
    pub format: LogFormat,
    /// Directory for daily-rolling log files. Console only when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiServerConfig,
    pub dispatcher: DispatcherConfig,
    pub http: HttpClientConfig,
    pub endpoints: BackendEndpoints,
    pub logging: LoggingSettings,
    /// Base URL of the tracker UI, used for test-notification permalinks.
    pub public_url: String,
}

impl AppConfig {
    /// Load from the process environment (after reading `.env`).
    pub fn from_env() -> Result<Self> {
        // A missing .env is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            ..Self::default()
        };

        if let Some(url) = var("DATABASE_URL") {
            config.database.url = url;
        }

        if let Some(bind_address) = var("API_BIND_ADDRESS") {
            config.api.bind_address = bind_address;
        }
        config.api.port = parse_or(&var, "API_PORT", config.api.port);

        let dispatcher = &mut config.dispatcher;
        dispatcher.workers = parse_or(&var, "DISPATCH_WORKERS", dispatcher.workers);
        dispatcher.queue_capacity =
            parse_or(&var, "DISPATCH_QUEUE_CAPACITY", dispatcher.queue_capacity);
        dispatcher.task_timeout_secs =
            parse_or(&var, "DISPATCH_TASK_TIMEOUT_SECS", dispatcher.task_timeout_secs);
        dispatcher.shutdown_grace_secs =
            parse_or(&var, "DISPATCH_SHUTDOWN_GRACE_SECS", dispatcher.shutdown_grace_secs);

        config.http.request_timeout_secs =
            parse_or(&var, "HTTP_REQUEST_TIMEOUT_SECS", config.http.request_timeout_secs);
        config.http.connect_timeout_secs =
            parse_or(&var, "HTTP_CONNECT_TIMEOUT_SECS", config.http.connect_timeout_secs);

        if let Some(url) = var("GITHUB_API_URL") {
            config.endpoints.github_api_url = url;
        }
        if let Some(url) = var("PAGERDUTY_EVENTS_URL") {
            config.endpoints.pagerduty_events_url = url;
        }
        if let Some(url) = var("PUBLIC_URL") {
            config.public_url = url;
        }

        config.logging.filter = var("LOG_FILTER");
        config.logging.format = match var("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        config.logging.dir = var("LOG_DIR").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.workers == 0 {
            return Err(Error::config("DISPATCH_WORKERS must be at least 1"));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(Error::config("DISPATCH_QUEUE_CAPACITY must be at least 1"));
        }
        if self.http.request_timeout_secs == 0 {
            return Err(Error::config("HTTP_REQUEST_TIMEOUT_SECS must be at least 1"));
        }
        if self.http.request_timeout_secs >= self.dispatcher.task_timeout_secs {
            return Err(Error::config(format!(
                "HTTP_REQUEST_TIMEOUT_SECS ({}) must be shorter than DISPATCH_TASK_TIMEOUT_SECS ({})",
                self.http.request_timeout_secs, self.dispatcher.task_timeout_secs
            )));
        }
        Ok(())
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "Invalid numeric setting, using default");
            default
        }),
    }
}
