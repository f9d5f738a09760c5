use std::sync::Arc;

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::investigators::{
    ApplicationInvestigator, DatabaseInvestigator, InfrastructureInvestigator, Investigator, NetworkInvestigator,
};
use crate::agent::{route, AgentContext, AgentSettings, Classifier, InvestigatorKey, Reporter, Verifier};
use crate::alert::AlertContext;
use crate::config::Config;
use crate::gateway::Gateways;
use crate::metrics::INVESTIGATIONS_TOTAL;
use crate::query::TemplateRegistry;
use crate::workflow::{InvestigationOutcome, InvestigationState};

/// Classifier -> Router -> Investigator -> Verifier -> Reporter.
///
/// Assembled once and shared; every run owns its own state.
pub struct Pipeline {
    classifier: Classifier,
    infrastructure: InfrastructureInvestigator,
    database: DatabaseInvestigator,
    application: ApplicationInvestigator,
    network: NetworkInvestigator,
    verifier: Verifier,
    reporter: Reporter,
}

impl Pipeline {
    /// Fails only when the template registry cannot be built.
    pub fn new(gateways: Gateways, settings: AgentSettings) -> crate::Result<Self> {
        let templates = Arc::new(TemplateRegistry::new()?);
        let classifier = Classifier::new(gateways.llm.clone(), settings.llm_timeout);
        let reporter = Reporter::new(gateways.llm.clone(), settings.reporter_model.clone(), settings.llm_timeout);
        let ctx = Arc::new(AgentContext::new(gateways, templates, settings));

        Ok(Self {
            classifier,
            infrastructure: InfrastructureInvestigator::new(ctx.clone()),
            database: DatabaseInvestigator::new(ctx.clone()),
            application: ApplicationInvestigator::new(ctx.clone()),
            network: NetworkInvestigator,
            verifier: Verifier::new(ctx),
            reporter,
        })
    }

    /// Build the HTTP gateways and settings from configuration.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let gateways = Gateways::from_config(config)?;
        let settings = AgentSettings::from_config(config)?;
        Self::new(gateways, settings)
    }

    pub fn investigator(&self, key: InvestigatorKey) -> &dyn Investigator {
        match key {
            InvestigatorKey::Infrastructure => &self.infrastructure,
            InvestigatorKey::Database => &self.database,
            InvestigatorKey::Application => &self.application,
            InvestigatorKey::Network => &self.network,
        }
    }

    /// Investigate one alert. Always returns a report.
    pub async fn investigate(&self, alert: AlertContext) -> InvestigationOutcome {
        self.investigate_run(Uuid::new_v4(), alert).await
    }

    pub async fn investigate_run(&self, run_id: Uuid, alert: AlertContext) -> InvestigationOutcome {
        let span = info_span!("investigation", run_id = %run_id, rule = %alert.rule_name);
        async move {
            info!("Starting investigation");
            let state = self.run(InvestigationState::new(alert)).await;
            let outcome = state.into_outcome();
            INVESTIGATIONS_TOTAL
                .with_label_values(&[outcome.classification.as_str()])
                .inc();
            info!(
                "Investigation finished: {} with {} steps",
                outcome.classification,
                outcome.steps.len()
            );
            outcome
        }
        .instrument(span)
        .await
    }

    /// Every stage in order over an existing state.
    pub async fn run(&self, state: InvestigationState) -> InvestigationState {
        let state = self.classifier.triage(state).await;

        let key = route(
            state.classification(),
            &state.alert().rule_name,
            &state.alert().monitoring_service,
        );
        info!("Routing to {} investigator", key);
        let state = state.with_step(format!("Routed to the {} investigator", key));

        let state = self.investigator(key).investigate(state).await;
        let state = self.verifier.verify(state).await;
        self.reporter.finalize(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Category;
    use crate::gateway::{GatewayError, MockLlmGateway, MockLogQueryGateway, MockMetricsGateway};

    fn offline_llm() -> MockLlmGateway {
        let mut llm = MockLlmGateway::new();
        llm.expect_classify().returning(|_| Err(GatewayError::Unavailable("offline".to_string())));
        llm.expect_generate().returning(|_, _, _| Err(GatewayError::Unavailable("offline".to_string())));
        llm
    }

    fn pipeline(llm: MockLlmGateway, metrics: MockMetricsGateway, logs: MockLogQueryGateway) -> Pipeline {
        let gateways = Gateways::new(Arc::new(llm), Arc::new(metrics), Arc::new(logs));
        Pipeline::new(gateways, AgentSettings::default()).unwrap()
    }

    #[test]
    fn test_every_key_has_an_investigator() {
        let pipeline = pipeline(offline_llm(), MockMetricsGateway::new(), MockLogQueryGateway::new());
        for category in Category::ALL {
            let key = InvestigatorKey::from(category);
            assert_eq!(pipeline.investigator(key).key(), key);
        }
    }

    #[tokio::test]
    async fn test_network_alert_runs_every_stage_offline() {
        let mut llm = MockLlmGateway::new();
        llm.expect_classify().returning(|_| Ok("NETWORK".to_string()));
        llm.expect_generate().returning(|_, _, _| Err(GatewayError::Timeout));

        let mut logs = MockLogQueryGateway::new();
        logs.expect_run_query().times(0);
        let mut metrics = MockMetricsGateway::new();
        metrics.expect_get_metric().times(0);

        let outcome = pipeline(llm, metrics, logs)
            .investigate(AlertContext::new("VPN gateway tunnel down"))
            .await;

        assert_eq!(outcome.classification, Category::Network);
        assert_eq!(
            outcome.steps,
            [
                "Classified as NETWORK by the triage model",
                "Routed to the network investigator",
                "Network investigation not yet implemented; no checks were run",
                "Verification skipped: network alerts are not re-checked",
            ]
        );
        assert!(outcome.report.contains("**Classification:** NETWORK"));
        assert!(outcome.report.contains("Network check skipped."));
    }
}
