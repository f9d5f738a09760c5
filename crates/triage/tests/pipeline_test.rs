mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use triage_agent::agent::evidence::CONFIG_ERROR_STEP;
use triage_agent::agent::AgentSettings;
use triage_agent::gateway::{GatewayError, QueryResult};
use triage_agent::query::{params, TemplateKey, TemplateRegistry, ValidationError};
use triage_agent::workflow::Verification;
use triage_agent::{AlertContext, Category, TriageEngine};

use common::*;

#[tokio::test]
async fn test_high_cpu_alert_end_to_end() {
    let metrics = FlatMetrics::new(97.0);
    let logs = StubLogs::success(vec![
        row(&[("ContainerAppName", json!("vm-01")), ("Log_s", json!("OOMKilled: worker exceeded memory limit"))]),
        row(&[("ContainerAppName", json!("vm-01")), ("Log_s", json!("restarting container"))]),
    ]);
    let pipeline = offline_pipeline(metrics.clone(), logs.clone());

    let alert = AlertContext::new("High CPU Usage on vm-01").with_target(VM_01);
    let outcome = pipeline.investigate(alert).await;

    assert_eq!(outcome.classification, Category::Infra);
    assert_eq!(outcome.steps[0], "Classified as INFRA by keyword fallback");
    assert_eq!(outcome.steps[1], "Routed to the infrastructure investigator");
    assert!(logs.calls() >= 1);
    assert!(outcome
        .steps
        .iter()
        .any(|s| s.starts_with("container_logs: Success, 2 rows")));

    assert!(outcome.report.contains("INFRA"));
    assert!(outcome.report.contains("OOMKilled: worker exceeded memory limit"));
    assert_eq!(outcome.verification, Some(Verification::StillActive));
    // phase 1 and the verifier both read the two infra metrics
    assert_eq!(metrics.calls(), 4);
}

#[tokio::test]
async fn test_nominal_metrics_never_query_logs() {
    let logs = StubLogs::success(Vec::new());
    let pipeline = offline_pipeline(FlatMetrics::new(50.0), logs.clone());

    let outcome = pipeline
        .investigate(AlertContext::new("High CPU Usage on vm-01").with_target(VM_01))
        .await;

    assert_eq!(logs.calls(), 0);
    assert!(outcome.steps.iter().any(|s| s.to_lowercase().contains("metrics nominal")));
    assert_eq!(outcome.verification, Some(Verification::Resolved));
    assert!(outcome.report.contains("self-resolved"));
}

#[tokio::test]
async fn test_malformed_resources_never_reach_log_gateway() {
    let long_name = "a".repeat(257);
    let bad_names = ["", long_name.as_str(), "vm\n01", "vm|take", "vm//01", "vm/*x*/"];

    let registry = TemplateRegistry::new().unwrap();
    for bad in bad_names {
        let err = registry
            .render_key(TemplateKey::ContainerLogs, &params([("resource_name", bad), ("lookback", "30m")]))
            .unwrap_err();
        assert!(
            matches!(
                err,
                ValidationError::Empty
                    | ValidationError::TooLong(_)
                    | ValidationError::ForbiddenSequence(_)
            ),
            "{:?} gave {:?}",
            bad,
            err
        );
    }

    for bad in &bad_names[1..] {
        let logs = StubLogs::success(Vec::new());
        let metrics = FlatMetrics::new(99.0);
        let pipeline = offline_pipeline(metrics.clone(), logs.clone());

        let alert = AlertContext::new("Failed requests above 5%").with_target(format!("{}/{}", ORDERS_API, bad));
        let outcome = pipeline.investigate(alert).await;

        assert_eq!(logs.calls(), 0, "log gateway reached for {:?}", bad);
        assert_eq!(metrics.calls(), 0, "metrics gateway reached for {:?}", bad);
        assert!(outcome.steps.iter().any(|s| s == CONFIG_ERROR_STEP));
        assert!(!outcome.report.is_empty());
    }
}

#[tokio::test]
async fn test_sanitizer_accepts_clean_identifiers_unchanged() {
    let registry = TemplateRegistry::new().unwrap();
    let query = registry
        .render_key(
            TemplateKey::AppExceptions,
            &params([("resource_name", "my-app_01.prod/eastus"), ("lookback", "30m")]),
        )
        .unwrap();
    assert!(query.as_str().contains(r#"AppRoleName has "my-app_01.prod/eastus""#));
}

#[tokio::test]
async fn test_application_fan_out_keeps_template_order() {
    // Slowest first, so completion order is the reverse of issue order.
    let logs = Arc::new(
        StubLogs::new(Ok(QueryResult::success(Vec::new())))
            .with_delay("union", Duration::from_millis(200))
            .with_delay("AppRequests", Duration::from_millis(100))
            .with_delay("AzureActivity", Duration::from_millis(10)),
    );
    let pipeline = offline_pipeline(FlatMetrics::new(95.0), logs.clone());

    let outcome = pipeline
        .investigate(AlertContext::new("Failed requests above 5%").with_target(ORDERS_API))
        .await;

    let diagnostics: Vec<&str> = outcome
        .steps
        .iter()
        .filter_map(|s| s.split(':').next())
        .filter(|label| {
            ["impact_analysis", "failure_patterns", "dependency_failures", "recent_changes"].contains(label)
        })
        .collect();
    assert_eq!(
        diagnostics,
        ["impact_analysis", "failure_patterns", "dependency_failures", "recent_changes"]
    );

    // The queries overlapped: the slow impact query finished after the
    // quick recent-changes one.
    let completed = logs.completed();
    let impact = completed.iter().position(|q| q.starts_with("union")).unwrap();
    let changes = completed.iter().position(|q| q.starts_with("AzureActivity")).unwrap();
    assert!(changes < impact, "completion order: {:?}", completed);
}

#[tokio::test]
async fn test_log_timeout_becomes_a_step() {
    let logs = Arc::new(
        StubLogs::new(Ok(QueryResult::success(Vec::new())))
            .with_delay("ContainerAppConsoleLogs", Duration::from_millis(500)),
    );
    let settings = AgentSettings {
        logs_timeout: Duration::from_millis(50),
        ..AgentSettings::default()
    };
    let pipeline = pipeline(
        Arc::new(triage_agent::gateway::DisabledLlm),
        FlatMetrics::new(97.0),
        logs,
        settings,
    );

    let outcome = pipeline
        .investigate(AlertContext::new("High CPU Usage on vm-01").with_target(VM_01))
        .await;

    assert!(outcome.steps.contains(&"Error fetching container_logs: timeout".to_string()));
    assert!(!outcome.report.is_empty());
}

#[tokio::test]
async fn test_reporter_falls_back_when_generate_fails() {
    let llm = ScriptedLlm::new(Ok("DATABASE".to_string()), Err(GatewayError::Timeout));
    let pipeline = pipeline(
        llm.clone(),
        FlatMetrics::new(96.0),
        StubLogs::success(Vec::new()),
        AgentSettings::default(),
    );

    let outcome = pipeline
        .investigate(
            AlertContext::new("DTU consumption above 90%")
                .with_target("/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Sql/servers/s/databases/orders-db"),
        )
        .await;

    assert_eq!(outcome.classification, Category::Database);
    assert_eq!(llm.generate_calls(), 1);
    assert!(outcome.report.contains("**Classification:** DATABASE"));
    assert!(outcome.report.contains("dtu_consumption_percent peaked at 96.0"));
}

#[tokio::test]
async fn test_model_report_is_returned_verbatim() {
    let report = "**Classification:** APPLICATION\n**Summary:** Checkout failing after deploy.\n**Evidence:** ...\n**Recommendation:** Roll back.";
    let llm = ScriptedLlm::new(Ok("APP".to_string()), Ok(report.to_string()));
    let pipeline = pipeline(
        llm.clone(),
        FlatMetrics::new(95.0),
        StubLogs::success(Vec::new()),
        AgentSettings::default(),
    );

    let outcome = pipeline
        .investigate(AlertContext::new("Checkout errors").with_target(ORDERS_API))
        .await;

    assert_eq!(outcome.classification, Category::Application);
    assert_eq!(outcome.report, report);
    // application analysis, then the final report
    assert_eq!(llm.generate_calls(), 2);
}

#[tokio::test]
async fn test_every_alert_gets_a_report() {
    let rules = [
        ("High CPU Usage on vm-01", Some(VM_01)),
        ("SQL DTU limit reached", None),
        ("Http 5xx on checkout", Some(ORDERS_API)),
        ("VPN tunnel down", None),
        ("", None),
    ];

    for (rule, target) in rules {
        let mut alert = AlertContext::new(rule);
        if let Some(target) = target {
            alert = alert.with_target(target);
        }
        let outcome = offline_pipeline(FlatMetrics::new(91.0), StubLogs::success(Vec::new()))
            .investigate(alert)
            .await;

        assert!(!outcome.report.trim().is_empty(), "empty report for {:?}", rule);
        assert!(!outcome.steps.is_empty());
        assert!(Category::ALL.contains(&outcome.classification));
    }
}

#[tokio::test]
async fn test_engine_runs_alerts_concurrently() {
    let logs = Arc::new(
        StubLogs::new(Ok(QueryResult::success(Vec::new())))
            .with_delay("ContainerAppConsoleLogs", Duration::from_millis(100)),
    );
    let pipeline = Arc::new(offline_pipeline(FlatMetrics::new(97.0), logs.clone()));
    let engine = Arc::new(TriageEngine::new(pipeline, 4));
    engine.clone().start().await;

    let started = Instant::now();
    let mut handles = Vec::new();
    for i in 0..4 {
        let alert = AlertContext::new(format!("High CPU Usage on vm-0{}", i)).with_target(VM_01);
        handles.push(engine.submit(alert).await.unwrap());
    }

    for handle in handles {
        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome.classification, Category::Infra);
    }
    let elapsed = started.elapsed();

    assert_eq!(logs.calls(), 4);
    // Serialized runs would hold one slow log query at a time and take at
    // least 4 x 100ms.
    assert!(logs.peak_in_flight() > 1, "log queries never overlapped");
    assert!(elapsed < Duration::from_millis(400), "runs took {:?}", elapsed);
}
