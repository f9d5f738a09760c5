//! Log Analytics Query Gateway
//!
//! Runs sanitized KQL against a Log Analytics workspace. Errors the backend
//! reports about the query itself come back as `Failure` / `PartialFailure`
//! results; only transport problems are returned as `GatewayError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::credentials::{scope_for, CredentialProvider};
use super::{GatewayError, LogQueryGateway, QueryResult, QueryRow};
use crate::query::SanitizedQuery;

pub struct LogAnalyticsGateway {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl LogAnalyticsGateway {
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
}

#[async_trait]
impl LogQueryGateway for LogAnalyticsGateway {
    async fn run_query(&self, query: &SanitizedQuery, workspace_id: &str) -> Result<QueryResult, GatewayError> {
        if workspace_id.trim().is_empty() {
            return Err(GatewayError::Unavailable(
                "log workspace id is not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/v1/workspaces/{}/query",
            self.endpoint.trim_end_matches('/'),
            workspace_id
        );

        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query.as_str() }))
            .timeout(self.timeout);

        if let Some(token) = self.credentials.bearer_token(&scope_for(&self.endpoint)).await? {
            request = request.bearer_auth(token);
        }

        debug!("Running log query against workspace {}", workspace_id);
        let response = request.send().await?;
        let status = response.status();

        if status.is_client_error() {
            let body: QueryResponse = response.json().await.unwrap_or_default();
            let message = body
                .error
                .map(|e| e.describe())
                .unwrap_or_else(|| format!("query rejected with status {}", status));
            warn!("Log query failed: {}", message);
            return Ok(QueryResult::failure(message));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "log query service returned {}: {}",
                status, error_text
            )));
        }

        let body: QueryResponse = response.json().await?;
        Ok(body.into_result())
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Table {
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown query error".to_string(),
        }
    }
}

impl QueryResponse {
    /// Rows of the primary (first) table; an `error` alongside data marks a
    /// partial result.
    fn into_result(self) -> QueryResult {
        let rows: Vec<QueryRow> = self
            .tables
            .into_iter()
            .next()
            .map(|table| {
                let names: Vec<String> = table.columns.into_iter().map(|c| c.name).collect();
                table
                    .rows
                    .into_iter()
                    .map(|row| names.iter().cloned().zip(row).collect())
                    .collect()
            })
            .unwrap_or_default();

        match self.error {
            Some(error) => QueryResult::partial(rows, error.describe()),
            None => QueryResult::success(rows),
        }
    }
}
