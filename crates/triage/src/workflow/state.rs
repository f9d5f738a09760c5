use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alert::{AlertContext, Category};

/// Verifier verdict on whether the alert condition still holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verification {
    StillActive,
    Resolved,
    Inconclusive,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::StillActive => write!(f, "still active"),
            Verification::Resolved => write!(f, "self-resolved"),
            Verification::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// The value threaded through the pipeline. Stages take it by value and
/// return a new one; steps only ever grow, the classification is written
/// once, and the draft report is written by an investigator and then
/// finalized by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationState {
    alert: Arc<AlertContext>,
    steps: Vec<String>,
    classification: Option<Category>,
    draft_report: Option<String>,
    report_finalized: bool,
    verification: Option<Verification>,
}

impl InvestigationState {
    pub fn new(alert: AlertContext) -> Self {
        Self::for_alert(Arc::new(alert))
    }

    pub fn for_alert(alert: Arc<AlertContext>) -> Self {
        Self {
            alert,
            steps: Vec::new(),
            classification: None,
            draft_report: None,
            report_finalized: false,
            verification: None,
        }
    }

    pub fn alert(&self) -> &AlertContext {
        &self.alert
    }

    pub fn shared_alert(&self) -> Arc<AlertContext> {
        Arc::clone(&self.alert)
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn classification(&self) -> Option<Category> {
        self.classification
    }

    pub fn draft_report(&self) -> Option<&str> {
        self.draft_report.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.report_finalized
    }

    pub fn verification(&self) -> Option<Verification> {
        self.verification
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.extend(steps.into_iter().map(Into::into));
        self
    }

    /// Set the classification. A classification that is already present is
    /// kept as is.
    pub fn with_classification(mut self, category: Category) -> Self {
        match self.classification {
            Some(existing) if existing != category => {
                warn!("Ignoring reclassification {} -> {}", existing, category);
            }
            Some(_) => {}
            None => self.classification = Some(category),
        }
        self
    }

    /// Investigator draft. Ignored once the reporter has finalized.
    pub fn with_draft_report(mut self, report: impl Into<String>) -> Self {
        if self.report_finalized {
            warn!("Ignoring draft report written after finalization");
        } else {
            self.draft_report = Some(report.into());
        }
        self
    }

    /// Reporter output; overwrites the draft and freezes it.
    pub fn with_final_report(mut self, report: impl Into<String>) -> Self {
        self.draft_report = Some(report.into());
        self.report_finalized = true;
        self
    }

    pub fn with_verification(mut self, verdict: Verification) -> Self {
        self.verification = Some(verdict);
        self
    }

    pub fn into_outcome(self) -> InvestigationOutcome {
        let classification = self.classification.unwrap_or_default();
        let report = self.draft_report.unwrap_or_default();
        InvestigationOutcome {
            classification,
            report,
            steps: self.steps,
            verification: self.verification,
        }
    }
}

/// What the caller of `investigate()` receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationOutcome {
    pub classification: Category,
    pub report: String,
    pub steps: Vec<String>,
    pub verification: Option<Verification>,
}
