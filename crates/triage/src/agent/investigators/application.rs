use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::info;

use super::phase::{apply_phase_one, MetricCheck};
use super::{analyse, run_template, Investigator};
use crate::agent::prompts::analysis_prompt;
use crate::agent::router::InvestigatorKey;
use crate::agent::AgentContext;
use crate::query::TemplateKey;
use crate::workflow::InvestigationState;

/// Diagnostic queries in the order their steps are recorded.
pub const DIAGNOSTIC_TEMPLATES: [TemplateKey; 4] = [
    TemplateKey::ImpactAnalysis,
    TemplateKey::FailurePatterns,
    TemplateKey::DependencyFailures,
    TemplateKey::RecentChanges,
];

/// Application alerts: four independent diagnostic queries issued
/// concurrently, then a model-written draft over the combined evidence.
pub struct ApplicationInvestigator {
    ctx: Arc<AgentContext>,
}

impl ApplicationInvestigator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Investigator for ApplicationInvestigator {
    fn key(&self) -> InvestigatorKey {
        InvestigatorKey::Application
    }

    async fn investigate(&self, state: InvestigationState) -> InvestigationState {
        let settings = &self.ctx.settings;
        let alert = state.shared_alert();
        let lookback = settings.lookback_param();

        let check = MetricCheck::run(&self.ctx, &alert, &settings.application_metrics, settings.lookback).await;
        let state = match apply_phase_one(self.key().as_str(), &check, state, &lookback) {
            ControlFlow::Break(state) => return state,
            ControlFlow::Continue(state) => state,
        };

        info!("Running {} diagnostic queries for '{}'", DIAGNOSTIC_TEMPLATES.len(), alert.rule_name);
        // join_all yields results in input order regardless of completion order
        let evidence: Vec<String> = join_all(
            DIAGNOSTIC_TEMPLATES
                .iter()
                .map(|key| run_template(&self.ctx, *key, &alert, &lookback)),
        )
        .await;
        let state = state.with_steps(evidence.iter().cloned());

        let prompt = analysis_prompt(&alert, "application failures and their blast radius", &evidence);
        let (state, analysis) = analyse(&self.ctx, state, prompt).await;
        let draft = analysis.unwrap_or_else(|| evidence.join("\n\n"));
        state.with_draft_report(draft)
    }
}
