pub mod agent;
pub mod alert;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod query;
pub mod workflow;

use thiserror::Error;

pub use alert::{AlertContext, Category};
pub use workflow::{InvestigationOutcome, InvestigationState, Pipeline, TriageEngine};

/// Startup-time failures. Nothing that happens while an alert is being
/// investigated is surfaced through this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Template error: {0}")]
    Template(#[from] query::ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
