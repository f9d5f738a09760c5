//! Azure Monitor Metrics Gateway
//!
//! Fetches one-minute averaged metric series for a resource.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

use super::credentials::{scope_for, CredentialProvider};
use super::{GatewayError, MetricSample, MetricsGateway};

const API_VERSION: &str = "2018-01-01";

pub struct AzureMonitorMetrics {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl AzureMonitorMetrics {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            credentials,
            timeout,
        }
    }

    fn url(&self, resource_id: &str) -> String {
        format!(
            "{}/{}/providers/Microsoft.Insights/metrics",
            self.endpoint.trim_end_matches('/'),
            resource_id.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl MetricsGateway for AzureMonitorMetrics {
    async fn get_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
        window: Duration,
    ) -> Result<Vec<MetricSample>, GatewayError> {
        let end = Utc::now();
        let span = chrono::Duration::from_std(window)
            .map_err(|e| GatewayError::Transport(format!("invalid window: {}", e)))?;
        let timespan = format!(
            "{}/{}",
            (end - span).to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let mut request = self
            .client
            .get(self.url(resource_id))
            .query(&[
                ("api-version", API_VERSION),
                ("metricnames", metric_name),
                ("timespan", timespan.as_str()),
                ("interval", "PT1M"),
                ("aggregation", "Average"),
            ])
            .timeout(self.timeout);

        if let Some(token) = self.credentials.bearer_token(&scope_for(&self.endpoint)).await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "metrics query failed ({}): {}",
                status, error_text
            )));
        }

        let body: MetricsResponse = response.json().await?;
        let samples = body.into_samples(metric_name);
        debug!("Fetched {} samples of {} for {}", samples.len(), metric_name, resource_id);
        Ok(samples)
    }
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricSeries>,
}

#[derive(Debug, Deserialize)]
struct MetricSeries {
    name: MetricName,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct MetricName {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    time_stamp: DateTime<Utc>,
    average: Option<f64>,
}

impl MetricsResponse {
    /// Flatten the response into ordered samples, skipping empty buckets.
    fn into_samples(self, requested: &str) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self
            .value
            .into_iter()
            .filter(|series| series.name.value.eq_ignore_ascii_case(requested))
            .flat_map(|series| {
                let name = series.name.value;
                let unit = series.unit;
                series
                    .timeseries
                    .into_iter()
                    .flat_map(|ts| ts.data)
                    .filter_map(move |point| {
                        point
                            .average
                            .map(|avg| MetricSample::new(name.clone(), avg, unit.clone(), point.time_stamp))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        samples
    }
}
