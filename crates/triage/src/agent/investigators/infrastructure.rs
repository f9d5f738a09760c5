use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::phase::{apply_phase_one, MetricCheck};
use super::{analyse, run_template, Investigator};
use crate::agent::prompts::analysis_prompt;
use crate::agent::router::InvestigatorKey;
use crate::agent::AgentContext;
use crate::workflow::InvestigationState;

/// Compute and container alerts: CPU and memory first, then the configured
/// log template when a threshold is breached.
pub struct InfrastructureInvestigator {
    ctx: Arc<AgentContext>,
}

impl InfrastructureInvestigator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Investigator for InfrastructureInvestigator {
    fn key(&self) -> InvestigatorKey {
        InvestigatorKey::Infrastructure
    }

    async fn investigate(&self, state: InvestigationState) -> InvestigationState {
        let settings = &self.ctx.settings;
        let alert = state.shared_alert();
        let lookback = settings.lookback_param();

        let check = MetricCheck::run(&self.ctx, &alert, &settings.infra_metrics, settings.lookback).await;
        let state = match apply_phase_one(self.key().as_str(), &check, state, &lookback) {
            ControlFlow::Break(state) => return state,
            ControlFlow::Continue(state) => state,
        };

        info!("Escalating '{}' to {} log query", alert.rule_name, settings.infra_log_template);
        let log_step = run_template(&self.ctx, settings.infra_log_template, &alert, &lookback).await;
        let state = state.with_step(log_step.clone());

        let mut evidence: Vec<String> = check.breaches().map(|r| r.describe()).collect();
        evidence.push(log_step.clone());
        let prompt = analysis_prompt(&alert, "compute and container health", &evidence);

        let (state, analysis) = analyse(&self.ctx, state, prompt).await;
        let draft = analysis.unwrap_or_else(|| {
            let breached = check.breaches().map(|r| r.describe()).collect::<Vec<_>>();
            let metrics = if breached.is_empty() {
                "No metric data was available".to_string()
            } else {
                format!("Threshold breached: {}", breached.join("; "))
            };
            format!("{}. Log evidence: {}", metrics, log_step)
        });
        state.with_draft_report(draft)
    }
}
