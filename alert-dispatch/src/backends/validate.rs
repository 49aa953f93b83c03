//! Save-time settings validation helpers shared by the backends.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use url::Url;

use super::BackendKind;
use crate::{Error, Result};

/// Decode raw settings JSON into a backend's typed settings.
pub fn parse_settings<T: DeserializeOwned>(kind: BackendKind, raw: serde_json::Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| {
        Error::validation(format!("Invalid {} settings: {}", kind.display_name(), e))
    })
}

pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Validate an absolute http(s) URL and return it trimmed.
pub fn http_url(field: &str, value: &str, https_only: bool) -> Result<String> {
    let value = value.trim();
    require_non_empty(field, value)?;

    let url = Url::parse(value)
        .map_err(|e| Error::validation(format!("{} is not a valid URL: {}", field, e)))?;

    match url.scheme() {
        "https" => {}
        "http" if !https_only => {}
        scheme => {
            let expected = if https_only { "https" } else { "http or https" };
            return Err(Error::validation(format!(
                "{} must use {} (got '{}')",
                field, expected, scheme
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("{} must include a host", field)));
    }

    Ok(value.to_string())
}

pub fn email(field: &str, value: &str) -> Result<()> {
    let value = value.trim();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(Error::validation(format!(
            "{} must be an email address (got '{}')",
            field, value
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

fn normalize_list<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept either a JSON array of strings or a comma-separated string.
pub fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<ListOrCsv>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListOrCsv::List(items)) => normalize_list(items.iter().map(String::as_str)),
        Some(ListOrCsv::Csv(raw)) => normalize_list(raw.split(',')),
    })
}

/// Treat blank optional strings as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
