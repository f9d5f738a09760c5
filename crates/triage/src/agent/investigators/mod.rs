//! Specialist Investigators
//!
//! Infrastructure, database and application investigators share a
//! two-phase policy: a cheap metric check that may short-circuit, then a
//! deeper look when a threshold is breached. The network investigator is a
//! placeholder that keeps the pipeline shape.

pub mod application;
pub mod database;
pub mod infrastructure;
pub mod network;
pub mod phase;

use async_trait::async_trait;
use tracing::warn;

use super::evidence::{gateway_error_step, query_step, CONFIG_ERROR_STEP};
use super::router::InvestigatorKey;
use super::AgentContext;
use crate::alert::AlertContext;
use crate::gateway::with_timeout;
use crate::query::{params, validate, TemplateKey, TemplateParams, ValidationError};
use crate::workflow::InvestigationState;

pub use application::ApplicationInvestigator;
pub use database::DatabaseInvestigator;
pub use infrastructure::InfrastructureInvestigator;
pub use network::NetworkInvestigator;
pub use phase::{MetricCheck, MetricReading};

/// Appends steps and sets the draft report; never clears existing steps.
#[async_trait]
pub trait Investigator: Send + Sync {
    fn key(&self) -> InvestigatorKey;

    async fn investigate(&self, state: InvestigationState) -> InvestigationState;
}

/// Standard template parameters for `alert`. The full resource identifier
/// is checked as well as the short name passed to the template.
pub(crate) fn template_params(alert: &AlertContext, lookback: &str) -> Result<TemplateParams, ValidationError> {
    if let Some(resource) = alert.primary_resource() {
        validate(resource)?;
    }
    Ok(params([("resource_name", alert.resource_name()), ("lookback", lookback)]))
}

/// Render one template for the alert's resource and run it. Every outcome,
/// including a rejected parameter, comes back as a single evidence step.
pub(crate) async fn run_template(
    ctx: &AgentContext,
    key: TemplateKey,
    alert: &AlertContext,
    lookback: &str,
) -> String {
    let query = match template_params(alert, lookback).and_then(|p| ctx.templates.render_key(key, &p)) {
        Ok(query) => query,
        Err(e) => {
            warn!("Refusing to run {}: {}", key, e);
            return CONFIG_ERROR_STEP.to_string();
        }
    };

    let settings = &ctx.settings;
    match with_timeout(
        settings.logs_timeout,
        ctx.gateways.logs.run_query(&query, &settings.workspace_id),
    )
    .await
    {
        Ok(result) => query_step(key.as_str(), &result),
        Err(e) => gateway_error_step("logs", key.as_str(), &e),
    }
}

/// Ask the analysis model for a draft. `None` when the call fails or
/// returns nothing; failures are recorded as a step.
pub(crate) async fn analyse(
    ctx: &AgentContext,
    state: InvestigationState,
    prompt: String,
) -> (InvestigationState, Option<String>) {
    let settings = &ctx.settings;
    let answer = with_timeout(
        settings.llm_timeout,
        ctx.gateways.llm.generate(&prompt, &settings.analysis_model, 0.0),
    )
    .await;

    match answer {
        Ok(text) => {
            let text = super::prompts::strip_reasoning(&text);
            if text.is_empty() {
                (state.with_step("Root-cause analysis returned no text"), None)
            } else {
                (state, Some(text))
            }
        }
        Err(e) => {
            let step = gateway_error_step("llm", "root-cause analysis", &e);
            (state.with_step(step), None)
        }
    }
}
