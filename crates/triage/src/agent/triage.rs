//! Alert Classifier
//!
//! Asks the triage model for a category token and falls back to ordered
//! keyword rules whenever the model fails, times out or answers with
//! anything outside the allow-list.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::prompts::{classification_prompt, strip_reasoning};
use crate::alert::{AlertContext, Category};
use crate::gateway::{with_timeout, GatewayError, LlmGateway};
use crate::metrics::{CLASSIFIER_FALLBACKS_TOTAL, GATEWAY_ERRORS_TOTAL};
use crate::workflow::InvestigationState;

const INFRA_KEYWORDS: &[&str] = &["cpu", "memory", "disk", "container", "vm"];
const DATABASE_KEYWORDS: &[&str] = &["sql", "database", "dtu"];

/// Why the model's answer was not used. Never leaves the classifier.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("unparsable classification: {0:?}")]
    Ambiguous(String),
    #[error("classification call failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// Where a category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    Llm,
    KeywordFallback,
}

/// Ordered keyword rules: infrastructure first, then database.
pub fn keyword_category(text: &str) -> Option<Category> {
    let text = text.to_lowercase();
    if INFRA_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some(Category::Infra)
    } else if DATABASE_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some(Category::Database)
    } else {
        None
    }
}

/// The keyword rules with their default arm.
pub fn keyword_fallback(text: &str) -> Category {
    keyword_category(text).unwrap_or(Category::Application)
}

/// Parse a model answer: reasoning blocks, quotes, backticks and
/// punctuation are stripped, and what remains must be exactly one
/// allow-listed token.
pub fn parse_category(raw: &str) -> Result<Category, ClassificationError> {
    let cleaned = strip_reasoning(raw);
    let token = cleaned.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if token.split_whitespace().count() != 1 {
        return Err(ClassificationError::Ambiguous(cleaned));
    }
    Category::from_token(token).ok_or_else(|| ClassificationError::Ambiguous(token.to_string()))
}

pub struct Classifier {
    llm: Arc<dyn LlmGateway>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmGateway>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Always terminates in a category.
    pub async fn classify(&self, alert: &AlertContext) -> Category {
        self.classify_with_source(alert).await.0
    }

    pub async fn classify_with_source(&self, alert: &AlertContext) -> (Category, ClassificationSource) {
        match self.ask_model(alert).await {
            Ok(category) => (category, ClassificationSource::Llm),
            Err(e) => {
                if let ClassificationError::Gateway(err) = &e {
                    GATEWAY_ERRORS_TOTAL.with_label_values(&["llm", err.kind()]).inc();
                }
                warn!("Classifier falling back to keyword rules: {}", e);
                CLASSIFIER_FALLBACKS_TOTAL.inc();
                let text = format!("{} {}", alert.rule_name, alert.description);
                (keyword_fallback(&text), ClassificationSource::KeywordFallback)
            }
        }
    }

    async fn ask_model(&self, alert: &AlertContext) -> Result<Category, ClassificationError> {
        let prompt = classification_prompt(alert);
        let answer = with_timeout(self.timeout, self.llm.classify(&prompt)).await?;
        debug!("Classifier raw answer: {:?}", answer);
        parse_category(&answer)
    }

    /// Pipeline stage. A state that is already classified passes through.
    pub async fn triage(&self, state: InvestigationState) -> InvestigationState {
        if let Some(existing) = state.classification() {
            debug!("Alert already classified as {}", existing);
            return state;
        }

        let (category, source) = self.classify_with_source(state.alert()).await;
        info!("Classified alert '{}' as {}", state.alert().rule_name, category);

        let step = match source {
            ClassificationSource::Llm => format!("Classified as {} by the triage model", category),
            ClassificationSource::KeywordFallback => {
                format!("Classified as {} by keyword fallback", category)
            }
        };
        state.with_classification(category).with_step(step)
    }
}
