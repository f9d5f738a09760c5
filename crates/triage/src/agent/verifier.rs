//! Verifier
//!
//! Re-checks whether the alert condition still holds over a shorter window.
//! Advisory only: it appends its verdict as steps and records a
//! [`Verification`]; it never touches the draft report.

use std::sync::Arc;

use tracing::{debug, info};

use super::evidence::{gateway_error_step, CONFIG_ERROR_STEP};
use super::investigators::{template_params, MetricCheck};
use super::AgentContext;
use crate::alert::{AlertContext, Category};
use crate::gateway::{with_timeout, QueryStatus};
use crate::query::TemplateKey;
use crate::workflow::{InvestigationState, Verification};

pub struct Verifier {
    ctx: Arc<AgentContext>,
}

impl Verifier {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    pub async fn verify(&self, state: InvestigationState) -> InvestigationState {
        let alert = state.shared_alert();
        let (steps, verdict) = match state.classification().unwrap_or_default() {
            Category::Infra => self.verify_metrics(&alert).await,
            Category::Database => self.verify_error_count(&alert, TemplateKey::SqlErrorCount, "SQL errors").await,
            Category::Application => {
                self.verify_error_count(&alert, TemplateKey::ExceptionCount, "exceptions").await
            }
            Category::Network => (
                vec!["Verification skipped: network alerts are not re-checked".to_string()],
                Verification::Inconclusive,
            ),
        };

        info!("Verification for '{}': {}", alert.rule_name, verdict);
        state.with_steps(steps).with_verification(verdict)
    }

    async fn verify_metrics(&self, alert: &AlertContext) -> (Vec<String>, Verification) {
        let settings = &self.ctx.settings;
        let window = settings.verification_param();

        let check = MetricCheck::run(&self.ctx, alert, &settings.infra_metrics, settings.verification_window).await;
        if check.invalid_resource {
            return (vec![CONFIG_ERROR_STEP.to_string()], Verification::Inconclusive);
        }
        if !check.has_resource {
            return (
                vec!["Verification skipped: alert has no target resource".to_string()],
                Verification::Inconclusive,
            );
        }

        let mut steps = check.errors.clone();
        let verdict = if check.is_breached() {
            let names: Vec<&str> = check.breaches().map(|r| r.metric_name.as_str()).collect();
            steps.push(format!(
                "Verification: {} still at or above {}% over last {}",
                names.join(", "),
                settings.threshold_percent,
                window
            ));
            Verification::StillActive
        } else if check.is_nominal() {
            steps.push(format!(
                "Verification: all metrics back below {}% over last {}; the condition appears to have self-resolved",
                settings.threshold_percent, window
            ));
            Verification::Resolved
        } else if check.readings.is_empty() {
            steps.push(format!("Verification: no current metric data over last {}", window));
            Verification::Inconclusive
        } else {
            steps.push(format!(
                "Verification: incomplete metric data over last {}; observed metrics below {}% but not every metric was read",
                window, settings.threshold_percent
            ));
            Verification::Inconclusive
        };
        (steps, verdict)
    }

    async fn verify_error_count(
        &self,
        alert: &AlertContext,
        key: TemplateKey,
        what: &str,
    ) -> (Vec<String>, Verification) {
        if alert.primary_resource().is_none() {
            return (
                vec!["Verification skipped: alert has no target resource".to_string()],
                Verification::Inconclusive,
            );
        }

        let settings = &self.ctx.settings;
        let window = settings.verification_param();

        let query = match template_params(alert, &window).and_then(|p| self.ctx.templates.render_key(key, &p)) {
            Ok(query) => query,
            Err(e) => {
                debug!("Verification query rejected: {}", e);
                return (vec![CONFIG_ERROR_STEP.to_string()], Verification::Inconclusive);
            }
        };

        let result = match with_timeout(
            settings.logs_timeout,
            self.ctx.gateways.logs.run_query(&query, &settings.workspace_id),
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                return (vec![gateway_error_step("logs", key.as_str(), &e)], Verification::Inconclusive);
            }
        };

        if result.status == QueryStatus::Failure {
            return (
                vec![format!(
                    "Verification: {} query failed ({})",
                    key,
                    result.error.as_deref().unwrap_or("no error detail")
                )],
                Verification::Inconclusive,
            );
        }

        let partial = if result.status == QueryStatus::PartialFailure { " (partial result)" } else { "" };
        match result.first_count() {
            Some(0) => (
                vec![format!(
                    "Verification: no {} in the last {}{}; the condition appears to have self-resolved",
                    what, window, partial
                )],
                Verification::Resolved,
            ),
            Some(n) => (
                vec![format!("Verification: {} {} in the last {}{}; still active", n, what, window, partial)],
                Verification::StillActive,
            ),
            None if result.rows.is_empty() && result.status == QueryStatus::Success => (
                vec![format!(
                    "Verification: no {} in the last {}; the condition appears to have self-resolved",
                    what, window
                )],
                Verification::Resolved,
            ),
            None => (
                vec![format!("Verification: {} count unreadable{}", what, partial)],
                Verification::Inconclusive,
            ),
        }
    }
}
