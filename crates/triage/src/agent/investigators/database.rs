use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::phase::{apply_phase_one, MetricCheck};
use super::{run_template, Investigator};
use crate::agent::router::InvestigatorKey;
use crate::agent::AgentContext;
use crate::query::TemplateKey;
use crate::workflow::InvestigationState;

/// SQL database alerts. The draft comes straight from the breached DTU,
/// CPU and storage readings; the SQL error log query only runs when
/// escalation is switched on.
pub struct DatabaseInvestigator {
    ctx: Arc<AgentContext>,
}

impl DatabaseInvestigator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Investigator for DatabaseInvestigator {
    fn key(&self) -> InvestigatorKey {
        InvestigatorKey::Database
    }

    async fn investigate(&self, state: InvestigationState) -> InvestigationState {
        let settings = &self.ctx.settings;
        let alert = state.shared_alert();
        let lookback = settings.lookback_param();

        let check = MetricCheck::run(&self.ctx, &alert, &settings.database_metrics, settings.lookback).await;
        let mut state = match apply_phase_one(self.key().as_str(), &check, state, &lookback) {
            ControlFlow::Break(state) => return state,
            ControlFlow::Continue(state) => state,
        };

        let breached: Vec<String> = check.breaches().map(|r| r.describe()).collect();
        let mut draft = if breached.is_empty() {
            format!(
                "Database '{}' could not be assessed from metrics: no readings were available over the last {}.",
                alert.resource_name(),
                lookback
            )
        } else {
            format!(
                "Database '{}' is under resource pressure: {}.",
                alert.resource_name(),
                breached.join("; ")
            )
        };

        if settings.database_escalate_to_logs {
            info!("Escalating '{}' to SQL error log query", alert.rule_name);
            let step = run_template(&self.ctx, TemplateKey::SqlErrors, &alert, &lookback).await;
            draft.push_str(&format!(" SQL error evidence: {}", step));
            state = state.with_step(step);
        } else {
            debug!("SQL error log escalation disabled");
        }

        state.with_draft_report(draft)
    }
}
