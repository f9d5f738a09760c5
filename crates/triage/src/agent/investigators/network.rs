use async_trait::async_trait;
use tracing::debug;

use super::Investigator;
use crate::agent::router::InvestigatorKey;
use crate::workflow::InvestigationState;

pub const NOT_IMPLEMENTED_STEP: &str = "Network investigation not yet implemented; no checks were run";
pub const PLACEHOLDER_DRAFT: &str = "Network check skipped.";

/// Placeholder. Keeps the pipeline shape for network alerts.
#[derive(Debug, Default)]
pub struct NetworkInvestigator;

#[async_trait]
impl Investigator for NetworkInvestigator {
    fn key(&self) -> InvestigatorKey {
        InvestigatorKey::Network
    }

    async fn investigate(&self, state: InvestigationState) -> InvestigationState {
        debug!("Network investigator short-circuits '{}'", state.alert().rule_name);
        state.with_step(NOT_IMPLEMENTED_STEP).with_draft_report(PLACEHOLDER_DRAFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertContext;

    #[tokio::test]
    async fn test_network_keeps_existing_steps() {
        let state = InvestigationState::new(AlertContext::new("VPN tunnel down")).with_step("Classified as NETWORK");
        let state = NetworkInvestigator.investigate(state).await;

        assert_eq!(state.steps(), ["Classified as NETWORK", NOT_IMPLEMENTED_STEP]);
        assert_eq!(state.draft_report(), Some(PLACEHOLDER_DRAFT));
    }
}
