//! Canonical request identity for deduplication and caching.

use std::fmt;

use crate::traits::{Headers, Method};

/// Canonical string identifying logically equivalent requests.
///
/// Format: `METHOD URL HEADERS BODY`, where `HEADERS` lists `name:value` pairs
/// with lower-cased names in sorted order, joined by `;`. The `Authorization`
/// header is excluded so a token refresh does not split otherwise identical
/// requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: Method, url: &str, headers: &Headers, body: Option<&str>) -> Self {
        let mut pairs: Vec<(String, &str)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
            .filter(|(name, _)| name != "authorization")
            .collect();
        pairs.sort();

        let headers = pairs
            .iter()
            .map(|(name, value)| format!("{}:{}", name, value))
            .collect::<Vec<_>>()
            .join(";");

        Self(format!(
            "{} {} {} {}",
            method.as_str(),
            url,
            headers,
            body.unwrap_or("")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
