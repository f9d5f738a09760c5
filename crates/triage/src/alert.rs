//! Alert Model
//!
//! The immutable alert context that enters the pipeline, the closed set of
//! triage categories, and parsing of Azure Monitor common-alert-schema payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Placeholder used in queries when an alert carries no target resource.
pub const UNKNOWN_RESOURCE: &str = "Unknown";

/// An incoming alert. Created once per alert and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    pub rule_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub monitoring_service: String,
    #[serde(default)]
    pub target_resource_ids: Vec<String>,
    #[serde(default = "Utc::now")]
    pub fired_at: DateTime<Utc>,
}

fn default_severity() -> String {
    "Sev3".to_string()
}

impl AlertContext {
    pub fn new(rule_name: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            description: String::new(),
            severity: default_severity(),
            monitoring_service: String::new(),
            target_resource_ids: Vec::new(),
            fired_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn with_monitoring_service(mut self, service: impl Into<String>) -> Self {
        self.monitoring_service = service.into();
        self
    }

    pub fn with_target(mut self, resource_id: impl Into<String>) -> Self {
        self.target_resource_ids.push(resource_id.into());
        self
    }

    /// The first target resource identifier, if the alert names one.
    pub fn primary_resource(&self) -> Option<&str> {
        self.target_resource_ids
            .first()
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    /// Short resource name used as the template parameter: the last
    /// `/`-separated segment of the primary resource.
    pub fn resource_name(&self) -> &str {
        self.primary_resource()
            .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_RESOURCE)
    }

    /// Parse an alert file: either an Azure Monitor common-alert-schema
    /// webhook payload or a bare `AlertContext` document.
    pub fn from_json(raw: &str) -> Result<Self> {
        if let Ok(payload) = serde_json::from_str::<CommonAlertPayload>(raw) {
            return Ok(payload.into());
        }
        Ok(serde_json::from_str(raw)?)
    }
}

/// Triage category. `Application` is the universal default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Infra,
    Database,
    #[default]
    Application,
    Network,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Infra,
        Category::Database,
        Category::Application,
        Category::Network,
    ];

    /// Match a classifier token against the allow-list. `APP` is the token
    /// for `Application`; anything else is rejected.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "INFRA" => Some(Category::Infra),
            "DATABASE" => Some(Category::Database),
            "NETWORK" => Some(Category::Network),
            "APP" => Some(Category::Application),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infra => "INFRA",
            Category::Database => "DATABASE",
            Category::Application => "APPLICATION",
            Category::Network => "NETWORK",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level wrapper sent by Azure Monitor action groups.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonAlertPayload {
    pub schema_id: String,
    pub data: CommonAlertData,
}

#[derive(Debug, Deserialize)]
pub struct CommonAlertData {
    pub essentials: AlertEssentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEssentials {
    #[serde(default)]
    pub alert_id: Option<String>,
    pub alert_rule: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub monitoring_service: String,
    #[serde(rename = "alertTargetIDs", default)]
    pub alert_target_ids: Vec<String>,
    #[serde(default)]
    pub fired_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CommonAlertPayload> for AlertContext {
    fn from(payload: CommonAlertPayload) -> Self {
        let essentials = payload.data.essentials;
        Self {
            rule_name: essentials.alert_rule,
            description: essentials.description.unwrap_or_default(),
            severity: essentials.severity,
            monitoring_service: essentials.monitoring_service,
            target_resource_ids: essentials.alert_target_ids,
            fired_at: essentials.fired_date_time.unwrap_or_else(Utc::now),
        }
    }
}
