//! Wire types of the webhook and compatibility endpoints.

use std::collections::{BTreeMap, HashSet};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Inbound repository change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeEvent {
    pub event: String,
    pub repository: String,
    pub branch: String,
    pub commit: String,
    /// Changed file paths, in the order the sender listed them.
    pub files: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ChangeEvent {
    /// True when any changed path contains one of `patterns` as a substring.
    pub fn touches_any(&self, patterns: &[String]) -> bool {
        self.files
            .iter()
            .any(|file| patterns.iter().any(|p| !p.is_empty() && file.contains(p.as_str())))
    }
}

/// Parameters of one compatibility run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityRequest {
    pub kubernetes_version: String,
    pub force_update: bool,
    pub files: Vec<String>,
    pub repository: String,
    pub branch: String,
}

/// Outcome of one compatibility run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub success: bool,
    /// Version of the first chart whose version parsed; empty when none did.
    pub chart_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_chart_version: Option<String>,
    pub api_versions: Vec<String>,
    pub deprecated_apis: Vec<String>,
    pub compatibility_issues: Vec<String>,
    pub message: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl CompatibilityResult {
    /// An empty, unsuccessful result stamped with the current time.
    pub fn new() -> Self {
        Self {
            success: false,
            chart_version: String::new(),
            new_chart_version: None,
            api_versions: Vec::new(),
            deprecated_apis: Vec::new(),
            compatibility_issues: Vec::new(),
            message: String::new(),
            timestamp: now_rfc3339(),
        }
    }

    /// Terminal failure with empty collections.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new()
        }
    }
}

impl Default for CompatibilityResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Body returned by the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_check: Option<CompatibilityResult>,
}

impl WebhookResponse {
    pub fn new(message: impl Into<String>, compatibility_check: Option<CompatibilityResult>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: now_rfc3339(),
            compatibility_check,
        }
    }
}

/// Removes repeated entries, keeping the first occurrence of each.
pub fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
