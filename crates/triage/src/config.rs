use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::query::TemplateRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub metrics: MetricsConfig,
    pub logs: LogsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub investigation: InvestigationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `ollama`, `anthropic`, `openai` or `none`
    pub provider: String,
    /// Base URL for Ollama
    pub endpoint: String,
    pub api_key: Option<String>,
    pub triage_model: String,
    pub analysis_model: String,
    pub reporter_model: String,
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            triage_model: "qwen3-vl:4b".to_string(),
            analysis_model: "gemma3:27b".to_string(),
            reporter_model: "qwen3-vl:4b".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://management.azure.com".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    pub endpoint: String,
    pub workspace_id: String,
    pub timeout_seconds: u64,
}

impl LogsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.loganalytics.io".to_string(),
            workspace_id: String::new(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub authority: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            authority: "https://login.microsoftonline.com".to_string(),
        }
    }
}

/// Knobs for the investigators and the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    pub lookback_minutes: u64,
    pub threshold_percent: f64,
    pub verification_window_minutes: u64,
    /// Template (canonical name or alias) the infrastructure investigator runs.
    pub infra_log_template: String,
    pub database_escalate_to_logs: bool,
    pub infra_metrics: Vec<String>,
    pub database_metrics: Vec<String>,
    pub application_metrics: Vec<String>,
}

impl InvestigationConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_minutes.saturating_mul(60))
    }

    pub fn verification_window(&self) -> Duration {
        Duration::from_secs(self.verification_window_minutes.saturating_mul(60))
    }
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: 30,
            threshold_percent: 90.0,
            verification_window_minutes: 15,
            infra_log_template: "container_logs".to_string(),
            database_escalate_to_logs: false,
            infra_metrics: strings(&["CpuPercentage", "MemoryPercentage"]),
            database_metrics: strings(&["dtu_consumption_percent", "cpu_percent", "storage_percent"]),
            application_metrics: strings(&["CpuPercentage", "MemoryPercentage"]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> crate::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            crate::Error::Config(format!("{} has an invalid value: {}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match env_opt(key) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => default,
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let llm_defaults = LlmConfig::default();
        let investigation_defaults = InvestigationConfig::default();

        let config = Config {
            llm: LlmConfig {
                provider: env_or("LLM_PROVIDER", &llm_defaults.provider).to_lowercase(),
                endpoint: env_or("OLLAMA_BASE_URL", &llm_defaults.endpoint),
                api_key: env_opt("LLM_API_KEY"),
                triage_model: env_or("LLM_MODEL_TRIAGE", &llm_defaults.triage_model),
                analysis_model: env_or("LLM_MODEL_ANALYSIS", &llm_defaults.analysis_model),
                reporter_model: env_or("LLM_MODEL_REPORTER", &llm_defaults.reporter_model),
                timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS", llm_defaults.timeout_seconds)?,
            },
            metrics: MetricsConfig {
                endpoint: env_or("METRICS_ENDPOINT", &MetricsConfig::default().endpoint),
                timeout_seconds: env_parse("METRICS_TIMEOUT_SECONDS", 60)?,
            },
            logs: LogsConfig {
                endpoint: env_or("LOGS_ENDPOINT", &LogsConfig::default().endpoint),
                workspace_id: env_or("LOG_WORKSPACE_ID", ""),
                timeout_seconds: env_parse("LOGS_TIMEOUT_SECONDS", 60)?,
            },
            credentials: CredentialsConfig {
                access_token: env_opt("AZURE_ACCESS_TOKEN"),
                tenant_id: env_opt("AZURE_TENANT_ID"),
                client_id: env_opt("AZURE_CLIENT_ID"),
                client_secret: env_opt("AZURE_CLIENT_SECRET"),
                authority: env_or("AZURE_AUTHORITY_HOST", &CredentialsConfig::default().authority),
            },
            investigation: InvestigationConfig {
                lookback_minutes: env_parse("INVESTIGATION_LOOKBACK_MINUTES", investigation_defaults.lookback_minutes)?,
                threshold_percent: env_parse("INVESTIGATION_THRESHOLD_PERCENT", investigation_defaults.threshold_percent)?,
                verification_window_minutes: env_parse(
                    "VERIFICATION_WINDOW_MINUTES",
                    investigation_defaults.verification_window_minutes,
                )?,
                infra_log_template: env_or("INFRA_LOG_TEMPLATE", &investigation_defaults.infra_log_template),
                database_escalate_to_logs: env_parse(
                    "DATABASE_ESCALATE_TO_LOGS",
                    investigation_defaults.database_escalate_to_logs,
                )?,
                infra_metrics: env_list("INFRA_METRICS", investigation_defaults.infra_metrics),
                database_metrics: env_list("DATABASE_METRICS", investigation_defaults.database_metrics),
                application_metrics: env_list("APPLICATION_METRICS", investigation_defaults.application_metrics),
            },
        };

        if config.logs.workspace_id.is_empty() {
            tracing::warn!("LOG_WORKSPACE_ID is not set. Log queries will be recorded as unavailable.");
        }
        if config.llm.api_key.is_none() && matches!(config.llm.provider.as_str(), "anthropic" | "claude" | "openai") {
            tracing::warn!("LLM_API_KEY is not set. Falling back to the provider's own environment variable.");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot be assembled from.
    pub fn validate(&self) -> crate::Result<()> {
        for (name, endpoint) in [
            ("OLLAMA_BASE_URL", &self.llm.endpoint),
            ("METRICS_ENDPOINT", &self.metrics.endpoint),
            ("LOGS_ENDPOINT", &self.logs.endpoint),
            ("AZURE_AUTHORITY_HOST", &self.credentials.authority),
        ] {
            url::Url::parse(endpoint)
                .map_err(|e| crate::Error::Config(format!("{} is not a valid URL ({}): {}", name, endpoint, e)))?;
        }

        if self.llm.timeout_seconds == 0 || self.metrics.timeout_seconds == 0 || self.logs.timeout_seconds == 0 {
            return Err(crate::Error::Config("gateway timeouts must be greater than zero".to_string()));
        }

        let investigation = &self.investigation;
        if !(investigation.threshold_percent > 0.0 && investigation.threshold_percent <= 100.0) {
            return Err(crate::Error::Config(format!(
                "INVESTIGATION_THRESHOLD_PERCENT must be in (0, 100], got {}",
                investigation.threshold_percent
            )));
        }
        if investigation.lookback_minutes == 0 || investigation.verification_window_minutes == 0 {
            return Err(crate::Error::Config("investigation windows must be greater than zero".to_string()));
        }
        for (name, minutes) in [
            ("INVESTIGATION_LOOKBACK_MINUTES", investigation.lookback_minutes),
            ("VERIFICATION_WINDOW_MINUTES", investigation.verification_window_minutes),
        ] {
            if minutes.checked_mul(60).is_none() {
                return Err(crate::Error::Config(format!("{} is out of range: {}", name, minutes)));
            }
        }

        TemplateRegistry::resolve(&investigation.infra_log_template).map_err(|e| {
            crate::Error::Config(format!("INFRA_LOG_TEMPLATE is not usable: {}", e))
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            metrics: MetricsConfig::default(),
            logs: LogsConfig::default(),
            credentials: CredentialsConfig::default(),
            investigation: InvestigationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.investigation.lookback(), Duration::from_secs(30 * 60));
        assert_eq!(config.investigation.verification_window(), Duration::from_secs(15 * 60));
        assert_eq!(config.metrics.timeout(), Duration::from_secs(60));
        assert_eq!(config.logs.timeout(), Duration::from_secs(60));
        assert_eq!(config.investigation.threshold_percent, 90.0);
        assert!(!config.investigation.database_escalate_to_logs);
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = Config::default();
        config.metrics.endpoint = "not a url".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = Config::default();
        config.investigation.threshold_percent = 0.0;
        assert!(config.validate().is_err());
        config.investigation.threshold_percent = 100.0;
        assert!(config.validate().is_ok());
        config.investigation.threshold_percent = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_windows_are_rejected() {
        let mut config = Config::default();
        config.investigation.lookback_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
        assert_eq!(config.investigation.lookback(), Duration::from_secs(u64::MAX));

        let mut config = Config::default();
        config.investigation.verification_window_minutes = u64::MAX / 2;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_infra_template_accepts_aliases_only_when_known() {
        let mut config = Config::default();
        config.investigation.infra_log_template = "container".to_string();
        assert!(config.validate().is_ok());
        config.investigation.infra_log_template = "kubernetes_events".to_string();
        assert!(config.validate().is_err());
    }
}
