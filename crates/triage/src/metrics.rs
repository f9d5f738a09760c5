use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref INVESTIGATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("triage_investigations_total", "Completed alert investigations."),
        &["classification"]
    )
    .unwrap();
    pub static ref CLASSIFIER_FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "triage_classifier_fallbacks_total",
        "Classifications decided by the keyword fallback."
    )
    .unwrap();
    pub static ref SHORT_CIRCUITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "triage_metric_short_circuits_total",
            "Investigations that stopped after nominal metrics."
        ),
        &["investigator"]
    )
    .unwrap();
    pub static ref GATEWAY_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("triage_gateway_errors_total", "Gateway calls absorbed as evidence."),
        &["gateway", "kind"]
    )
    .unwrap();
}

/// Register every collector with [`REGISTRY`]. Call once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(INVESTIGATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLASSIFIER_FALLBACKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SHORT_CIRCUITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GATEWAY_ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Text exposition of everything registered.
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| crate::Error::Unavailable(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Unavailable(format!("metrics are not UTF-8: {}", e)))
}
