use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a security alert as reported by the upstream webhook.
///
/// Parsing is case-insensitive and any unrecognized value maps to
/// `Unknown`, so a frame with a severity we have never seen still lands
/// in the feed instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }

    /// Whether this severity counts toward the dashboard's "critical alerts"
    /// metric (critical and high are both counted there).
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Unknown
    }
}

impl FromStr for Severity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        })
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Severity::Unknown)
    }
}

impl From<Severity> for String {
    fn from(s: Severity) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package metadata attached to a dependency alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub ecosystem: String,
}

/// Attribution sub-record for the sending user or organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A single security alert pushed by the server over the live feed.
///
/// Immutable once received; only the feed holding alerts ever changes.
/// Extra JSON fields are ignored and optional fields may be absent, so
/// both full webhook payloads and the backend's condensed broadcast
/// shape deserialize into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_id: String,
    pub repository: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub package_version: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO-8601 timestamp as sent by the server.
    pub timestamp: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub package_info: Option<PackageInfo>,
    #[serde(default)]
    pub sender: Option<Actor>,
    #[serde(default)]
    pub organization: Option<Actor>,
}

impl SecurityAlert {
    /// Parsed timestamp, if the server sent a well-formed RFC 3339 string.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether this alert's timestamp falls within `window` of `now`.
    /// Alerts with unparseable timestamps are never considered recent.
    pub fn is_recent(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.received_at() {
            Some(at) => now.signed_duration_since(at) <= window,
            None => false,
        }
    }
}
