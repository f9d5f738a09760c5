//! Triage Agents
//!
//! The pipeline stages: classifier, router, the specialist investigators,
//! the verifier and the reporter. Each stage takes an `InvestigationState`
//! by value and hands back the next one.

pub mod evidence;
pub mod investigators;
pub mod prompts;
pub mod reporter;
pub mod router;
pub mod triage;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::gateway::Gateways;
use crate::query::{TemplateKey, TemplateRegistry};

pub use investigators::Investigator;
pub use reporter::Reporter;
pub use router::{route, InvestigatorKey};
pub use triage::{ClassificationError, Classifier};
pub use verifier::Verifier;

/// Resolved knobs every stage reads.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub workspace_id: String,
    pub threshold_percent: f64,
    pub lookback: Duration,
    pub verification_window: Duration,
    pub metrics_timeout: Duration,
    pub logs_timeout: Duration,
    pub llm_timeout: Duration,
    pub analysis_model: String,
    pub reporter_model: String,
    pub infra_log_template: TemplateKey,
    pub database_escalate_to_logs: bool,
    pub infra_metrics: Vec<String>,
    pub database_metrics: Vec<String>,
    pub application_metrics: Vec<String>,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let investigation = &config.investigation;
        let infra_log_template = TemplateRegistry::resolve(&investigation.infra_log_template)
            .map_err(|e| crate::Error::Config(format!("INFRA_LOG_TEMPLATE is not usable: {}", e)))?;

        Ok(Self {
            workspace_id: config.logs.workspace_id.clone(),
            threshold_percent: investigation.threshold_percent,
            lookback: investigation.lookback(),
            verification_window: investigation.verification_window(),
            metrics_timeout: config.metrics.timeout(),
            logs_timeout: config.logs.timeout(),
            llm_timeout: config.llm.timeout(),
            analysis_model: config.llm.analysis_model.clone(),
            reporter_model: config.llm.reporter_model.clone(),
            infra_log_template,
            database_escalate_to_logs: investigation.database_escalate_to_logs,
            infra_metrics: investigation.infra_metrics.clone(),
            database_metrics: investigation.database_metrics.clone(),
            application_metrics: investigation.application_metrics.clone(),
        })
    }

    /// Lookback rendered for KQL `ago()`, e.g. `30m`.
    pub fn lookback_param(&self) -> String {
        minutes_param(self.lookback)
    }

    pub fn verification_param(&self) -> String {
        minutes_param(self.verification_window)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        // Config defaults always resolve.
        let config = Config::default();
        let investigation = &config.investigation;
        Self {
            workspace_id: "workspace".to_string(),
            threshold_percent: investigation.threshold_percent,
            lookback: investigation.lookback(),
            verification_window: investigation.verification_window(),
            metrics_timeout: config.metrics.timeout(),
            logs_timeout: config.logs.timeout(),
            llm_timeout: config.llm.timeout(),
            analysis_model: config.llm.analysis_model.clone(),
            reporter_model: config.llm.reporter_model.clone(),
            infra_log_template: TemplateKey::ContainerLogs,
            database_escalate_to_logs: investigation.database_escalate_to_logs,
            infra_metrics: investigation.infra_metrics.clone(),
            database_metrics: investigation.database_metrics.clone(),
            application_metrics: investigation.application_metrics.clone(),
        }
    }
}

fn minutes_param(window: Duration) -> String {
    format!("{}m", (window.as_secs() / 60).max(1))
}

/// Shared, read-only context for all stages of a pipeline.
#[derive(Clone)]
pub struct AgentContext {
    pub gateways: Gateways,
    pub templates: Arc<TemplateRegistry>,
    pub settings: Arc<AgentSettings>,
}

impl AgentContext {
    pub fn new(gateways: Gateways, templates: Arc<TemplateRegistry>, settings: AgentSettings) -> Self {
        Self {
            gateways,
            templates,
            settings: Arc::new(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.logs.workspace_id = "ws-1".to_string();
        config.investigation.infra_log_template = "containerappconsolelogs".to_string();
        config.investigation.database_escalate_to_logs = true;

        let settings = AgentSettings::from_config(&config).unwrap();
        assert_eq!(settings.workspace_id, "ws-1");
        assert_eq!(settings.infra_log_template, TemplateKey::ContainerLogs);
        assert!(settings.database_escalate_to_logs);
        assert_eq!(settings.lookback_param(), "30m");
        assert_eq!(settings.verification_param(), "15m");
    }

    #[test]
    fn test_unknown_infra_template_is_config_error() {
        let mut config = Config::default();
        config.investigation.infra_log_template = "nope".to_string();
        assert!(matches!(AgentSettings::from_config(&config), Err(crate::Error::Config(_))));
    }
}
