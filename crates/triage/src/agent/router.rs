//! Investigator routing. Pure and total.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::triage::keyword_category;
use crate::alert::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestigatorKey {
    Infrastructure,
    Database,
    Application,
    Network,
}

impl InvestigatorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigatorKey::Infrastructure => "infrastructure",
            InvestigatorKey::Database => "database",
            InvestigatorKey::Application => "application",
            InvestigatorKey::Network => "network",
        }
    }
}

impl fmt::Display for InvestigatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Category> for InvestigatorKey {
    fn from(category: Category) -> Self {
        match category {
            Category::Infra => InvestigatorKey::Infrastructure,
            Category::Database => InvestigatorKey::Database,
            Category::Network => InvestigatorKey::Network,
            Category::Application => InvestigatorKey::Application,
        }
    }
}

/// Pick the investigator. Without a classification the keyword rules are
/// re-applied to the rule name and monitoring service; a platform or
/// infrastructure monitoring service counts as an infrastructure signal.
pub fn route(classification: Option<Category>, rule_name: &str, monitoring_service: &str) -> InvestigatorKey {
    if let Some(category) = classification {
        return category.into();
    }

    let text = format!("{} {}", rule_name, monitoring_service);
    if let Some(category) = keyword_category(&text) {
        return category.into();
    }

    match monitoring_service.trim().to_ascii_lowercase().as_str() {
        "platform" | "infrastructure" => InvestigatorKey::Infrastructure,
        _ => InvestigatorKey::Application,
    }
}
