//! Phase 1: the cheap metric check shared by the two-phase investigators.

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, warn};

use crate::agent::evidence::{gateway_error_step, CONFIG_ERROR_STEP};
use crate::agent::AgentContext;
use crate::alert::AlertContext;
use crate::gateway::{with_timeout, MetricSample};
use crate::metrics::SHORT_CIRCUITS_TOTAL;
use crate::query::validate;
use crate::workflow::InvestigationState;

/// Peak of one metric over the window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub metric_name: String,
    pub peak: f64,
    pub unit: String,
    pub threshold: f64,
    pub breached: bool,
}

impl MetricReading {
    fn from_samples(samples: &[MetricSample], threshold: f64) -> Option<Self> {
        let peak = samples
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))?;
        Some(Self {
            metric_name: peak.metric_name.clone(),
            peak: peak.value,
            unit: peak.unit.clone(),
            threshold,
            breached: samples.iter().any(MetricSample::is_breach),
        })
    }

    pub fn describe(&self) -> String {
        format!(
            "{} peaked at {:.1} {} (threshold {}%)",
            self.metric_name, self.peak, self.unit, self.threshold
        )
    }
}

/// Result of fetching a metric set for the alert's primary resource.
#[derive(Debug, Clone, Default)]
pub struct MetricCheck {
    pub readings: Vec<MetricReading>,
    /// Gateway failures and other notes, already worded as steps.
    pub errors: Vec<String>,
    /// The resource identifier failed sanitization; nothing was fetched.
    pub invalid_resource: bool,
    pub has_resource: bool,
}

impl MetricCheck {
    /// Fetch `metric_names` over `window`, one at a time, and compare every
    /// sample against the configured threshold.
    pub async fn run(ctx: &AgentContext, alert: &AlertContext, metric_names: &[String], window: Duration) -> Self {
        let mut check = MetricCheck::default();

        let Some(resource) = alert.primary_resource() else {
            return check;
        };
        if let Err(e) = validate(resource) {
            warn!("Rejecting target resource {:?}: {}", resource, e);
            check.invalid_resource = true;
            return check;
        }
        check.has_resource = true;

        let settings = &ctx.settings;
        for name in metric_names {
            let fetched = with_timeout(
                settings.metrics_timeout,
                ctx.gateways.metrics.get_metric(resource, name, window),
            )
            .await;

            match fetched {
                Ok(samples) => {
                    let samples: Vec<MetricSample> = samples
                        .into_iter()
                        .map(|s| s.with_threshold(settings.threshold_percent))
                        .collect();
                    match MetricReading::from_samples(&samples, settings.threshold_percent) {
                        Some(reading) => {
                            debug!("{}", reading.describe());
                            check.readings.push(reading);
                        }
                        None => check.errors.push(format!("No samples for {} over the window", name)),
                    }
                }
                Err(e) => check.errors.push(gateway_error_step("metrics", name, &e)),
            }
        }

        check
    }

    pub fn breaches(&self) -> impl Iterator<Item = &MetricReading> {
        self.readings.iter().filter(|r| r.breached)
    }

    pub fn is_breached(&self) -> bool {
        self.readings.iter().any(|r| r.breached)
    }

    /// Nominal needs a reading for every requested metric and no breach. A
    /// metric that failed to fetch or had no samples counts as unknown.
    pub fn is_nominal(&self) -> bool {
        self.errors.is_empty() && !self.readings.is_empty() && !self.is_breached()
    }

    /// Phase 1 evidence: one line per reading plus the recorded errors.
    pub fn steps(&self, lookback: &str) -> Vec<String> {
        if self.invalid_resource {
            return vec![CONFIG_ERROR_STEP.to_string()];
        }
        if !self.has_resource {
            return vec!["No target resource on alert; metric checks skipped".to_string()];
        }

        let mut steps: Vec<String> = self
            .readings
            .iter()
            .map(|r| {
                let verdict = if r.breached { "breached" } else { "nominal" };
                format!("{} over last {}: {}", r.describe(), lookback, verdict)
            })
            .collect();
        steps.extend(self.errors.iter().cloned());
        steps
    }
}

/// Record phase 1 on the state. Breaks when the investigation ends here:
/// the metrics are nominal or the resource was rejected.
pub(crate) fn apply_phase_one(
    investigator: &'static str,
    check: &MetricCheck,
    state: InvestigationState,
    lookback: &str,
) -> ControlFlow<InvestigationState, InvestigationState> {
    let state = state.with_steps(check.steps(lookback));

    if check.invalid_resource {
        let summary = format!(
            "Investigation stopped: the alert's target resource '{}' is not a valid resource identifier.",
            state.alert().primary_resource().unwrap_or_default()
        );
        return ControlFlow::Break(state.with_draft_report(summary));
    }

    if check.is_nominal() {
        SHORT_CIRCUITS_TOTAL.with_label_values(&[investigator]).inc();
        let metric_names = check
            .readings
            .iter()
            .map(|r| r.metric_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let step = format!(
            "Metrics nominal: all {} metrics below {}% over last {}",
            check.readings.len(),
            check.readings[0].threshold,
            lookback
        );
        let summary = format!(
            "No anomaly detected for '{}': {} stayed below threshold over the last {}. Deep log queries were not run.",
            state.alert().rule_name,
            metric_names,
            lookback
        );
        return ControlFlow::Break(state.with_step(step).with_draft_report(summary));
    }

    ControlFlow::Continue(state)
}
