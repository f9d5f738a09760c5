//! External Gateways
//!
//! Call contracts for the LLM, metrics and log backends, the shared value types
//! they exchange, and the concrete HTTP implementations wired up at startup.

pub mod credentials;
pub mod llm;
pub mod logs;
pub mod metrics;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::query::SanitizedQuery;

pub use credentials::{ClientSecretCredential, CredentialProvider, StaticToken};
pub use llm::{create_llm_gateway, DisabledLlm, OllamaGateway, RigGateway};
pub use logs::LogAnalyticsGateway;
pub use metrics::AzureMonitorMetrics;

/// Transport-level failure talking to an external backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Timeout => "timeout",
            GatewayError::Transport(_) => "transport",
            GatewayError::Decode(_) => "decode",
            GatewayError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Bound a gateway call by `limit`; elapsing maps to [`GatewayError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout),
    }
}

/// One point of a metric time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    /// Threshold the sample was compared against, once evaluated.
    pub threshold: Option<f64>,
}

impl MetricSample {
    pub fn new(metric_name: impl Into<String>, value: f64, unit: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric_name: metric_name.into(),
            value,
            unit: unit.into(),
            timestamp,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// True when the sample is at or above its threshold.
    pub fn is_breach(&self) -> bool {
        self.threshold.map_or(false, |t| self.value >= t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Success,
    PartialFailure,
    Failure,
}

pub type QueryRow = BTreeMap<String, serde_json::Value>;

/// Outcome of a log query that reached the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub rows: Vec<QueryRow>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn success(rows: Vec<QueryRow>) -> Self {
        Self {
            status: QueryStatus::Success,
            rows,
            error: None,
        }
    }

    pub fn partial(rows: Vec<QueryRow>, error: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::PartialFailure,
            rows,
            error: Some(error.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::Failure,
            rows: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// First numeric cell of the first row, preferring a `Count` column.
    pub fn first_count(&self) -> Option<u64> {
        let row = self.rows.first()?;
        row.get("Count")
            .and_then(as_count)
            .or_else(|| row.values().find_map(as_count))
    }
}

fn as_count(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Large language model backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Single-token classification with the triage model.
    async fn classify(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Free-form generation with an explicit model and temperature.
    async fn generate(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, GatewayError>;
}

/// Metric time-series backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsGateway: Send + Sync {
    async fn get_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
        window: Duration,
    ) -> Result<Vec<MetricSample>, GatewayError>;
}

/// Log query backend. Query-level failures come back as a [`QueryStatus`];
/// only transport failures are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogQueryGateway: Send + Sync {
    async fn run_query(&self, query: &SanitizedQuery, workspace_id: &str) -> Result<QueryResult, GatewayError>;
}

/// The three gateways a pipeline talks to.
#[derive(Clone)]
pub struct Gateways {
    pub llm: Arc<dyn LlmGateway>,
    pub metrics: Arc<dyn MetricsGateway>,
    pub logs: Arc<dyn LogQueryGateway>,
}

impl Gateways {
    pub fn new(
        llm: Arc<dyn LlmGateway>,
        metrics: Arc<dyn MetricsGateway>,
        logs: Arc<dyn LogQueryGateway>,
    ) -> Self {
        Self { llm, metrics, logs }
    }

    /// Build the HTTP gateways. One connection pool and one credential
    /// provider are created here and shared by every gateway.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let credentials = credentials::from_config(&config.credentials, http.clone());
        info!(
            "Gateways: llm={} metrics={} logs={}",
            config.llm.provider, config.metrics.endpoint, config.logs.endpoint
        );

        Ok(Self {
            llm: create_llm_gateway(&config.llm, http.clone())?,
            metrics: Arc::new(AzureMonitorMetrics::new(
                http.clone(),
                config.metrics.endpoint.clone(),
                credentials.clone(),
                config.metrics.timeout(),
            )),
            logs: Arc::new(LogAnalyticsGateway::new(
                http,
                config.logs.endpoint.clone(),
                credentials,
                config.logs.timeout(),
            )),
        })
    }
}
