//! Stub gateways that count calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use triage_agent::agent::AgentSettings;
use triage_agent::gateway::{
    DisabledLlm, GatewayError, Gateways, LlmGateway, LogQueryGateway, MetricSample, MetricsGateway, QueryResult,
    QueryRow,
};
use triage_agent::query::SanitizedQuery;
use triage_agent::Pipeline;

pub const VM_01: &str = "/subscriptions/s1/resourceGroups/rg-prod/providers/Microsoft.Compute/virtualMachines/vm-01";
pub const ORDERS_API: &str = "/subscriptions/s1/resourceGroups/rg-prod/providers/Microsoft.Web/sites/orders-api";

/// Returns the same percentage for every metric.
pub struct FlatMetrics {
    value: f64,
    calls: AtomicUsize,
}

impl FlatMetrics {
    pub fn new(value: f64) -> Arc<Self> {
        Arc::new(Self {
            value,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsGateway for FlatMetrics {
    async fn get_metric(
        &self,
        _resource_id: &str,
        metric_name: &str,
        _window: Duration,
    ) -> Result<Vec<MetricSample>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        Ok(vec![
            MetricSample::new(metric_name, self.value / 2.0, "Percent", now - chrono::Duration::minutes(2)),
            MetricSample::new(metric_name, self.value, "Percent", now - chrono::Duration::minutes(1)),
        ])
    }
}

/// Answers every query with `result` after an optional per-table delay,
/// recording the order in which queries complete and how many were in
/// flight at once.
pub struct StubLogs {
    result: Result<QueryResult, GatewayError>,
    delays: HashMap<&'static str, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl StubLogs {
    pub fn new(result: Result<QueryResult, GatewayError>) -> Self {
        Self {
            result,
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn success(rows: Vec<QueryRow>) -> Arc<Self> {
        Arc::new(Self::new(Ok(QueryResult::success(rows))))
    }

    /// Delay queries whose text starts with `prefix`.
    pub fn with_delay(mut self, prefix: &'static str, delay: Duration) -> Self {
        self.delays.insert(prefix, delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most queries observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogQueryGateway for StubLogs {
    async fn run_query(&self, query: &SanitizedQuery, _workspace_id: &str) -> Result<QueryResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let first_line = query.as_str().lines().next().unwrap_or_default().to_string();

        if let Some(delay) = self
            .delays
            .iter()
            .find(|(prefix, _)| first_line.starts_with(*prefix))
            .map(|(_, delay)| *delay)
        {
            tokio::time::sleep(delay).await;
        }

        self.completed.lock().unwrap().push(first_line);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Fixed answers for both LLM calls.
pub struct ScriptedLlm {
    pub classify: Result<String, GatewayError>,
    pub generate: Result<String, GatewayError>,
    generate_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(classify: Result<String, GatewayError>, generate: Result<String, GatewayError>) -> Arc<Self> {
        Arc::new(Self {
            classify,
            generate,
            generate_calls: AtomicUsize::new(0),
        })
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmGateway for ScriptedLlm {
    async fn classify(&self, _prompt: &str) -> Result<String, GatewayError> {
        self.classify.clone()
    }

    async fn generate(&self, _prompt: &str, _model: &str, _temperature: f32) -> Result<String, GatewayError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generate.clone()
    }
}

pub fn row(pairs: &[(&str, serde_json::Value)]) -> QueryRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn pipeline(
    llm: Arc<dyn LlmGateway>,
    metrics: Arc<dyn MetricsGateway>,
    logs: Arc<dyn LogQueryGateway>,
    settings: AgentSettings,
) -> Pipeline {
    Pipeline::new(Gateways::new(llm, metrics, logs), settings).unwrap()
}

pub fn offline_pipeline(metrics: Arc<dyn MetricsGateway>, logs: Arc<dyn LogQueryGateway>) -> Pipeline {
    pipeline(Arc::new(DisabledLlm), metrics, logs, AgentSettings::default())
}
