//! Reporter
//!
//! Formats the steps into an evidence block and asks the reporter model for
//! the final structured report. A failed or empty answer falls back to a
//! mechanical report, so every run ends with readable text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::evidence::gateway_error_step;
use super::prompts::{bullet_list, report_prompt, strip_reasoning};
use crate::gateway::{with_timeout, LlmGateway};
use crate::workflow::{InvestigationState, Verification};

pub struct Reporter {
    llm: Arc<dyn LlmGateway>,
    model: String,
    timeout: Duration,
}

impl Reporter {
    pub fn new(llm: Arc<dyn LlmGateway>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            llm,
            model: model.into(),
            timeout,
        }
    }

    /// The final report text for `state`. Never empty.
    pub async fn report(&self, state: &InvestigationState) -> String {
        let classification = state.classification().unwrap_or_default();
        let prompt = report_prompt(
            state.alert(),
            classification.as_str(),
            state.draft_report(),
            state.steps(),
            state.verification(),
        );

        match with_timeout(self.timeout, self.llm.generate(&prompt, &self.model, 0.0)).await {
            Ok(text) => {
                let text = strip_reasoning(&text);
                if text.is_empty() {
                    warn!("Reporter model returned an empty report; assembling it mechanically");
                    mechanical_report(state, "the reporter model returned no text")
                } else {
                    text
                }
            }
            Err(e) => {
                let reason = gateway_error_step("llm", "final report", &e);
                mechanical_report(state, &reason)
            }
        }
    }

    /// Pipeline stage: overwrite the draft with the final report.
    pub async fn finalize(&self, state: InvestigationState) -> InvestigationState {
        let report = self.report(&state).await;
        info!("Report ready for '{}' ({} characters)", state.alert().rule_name, report.len());
        state.with_final_report(report)
    }
}

/// Deterministic report from the classification, draft and evidence.
pub fn mechanical_report(state: &InvestigationState, reason: &str) -> String {
    let alert = state.alert();
    let classification = state.classification().unwrap_or_default();

    let mut summary = match state.draft_report() {
        Some(draft) if !draft.trim().is_empty() => draft.trim().to_string(),
        _ => format!(
            "Alert '{}' ({}) fired at {}; {} investigation steps were recorded.",
            alert.rule_name,
            alert.severity,
            alert.fired_at.to_rfc3339(),
            state.steps().len()
        ),
    };
    if state.verification() == Some(Verification::Resolved) {
        summary.push_str(" The alert condition appears to have self-resolved.");
    }

    let recommendation = match state.verification() {
        Some(Verification::StillActive) => {
            "The condition is still active. Escalate to the owning team and start from the evidence above."
        }
        Some(Verification::Resolved) => {
            "No immediate action needed. Watch for recurrence and review the alert threshold if it keeps firing."
        }
        _ => "Confirm the alert condition manually, starting from the evidence above.",
    };

    format!(
        "**Classification:** {}\n\n**Summary:** {}\n\n**Evidence:**\n{}\n\n**Recommendation:** {}\n\n_Report assembled without model assistance ({})._",
        classification,
        summary,
        bullet_list(state.steps()),
        recommendation,
        reason
    )
}
