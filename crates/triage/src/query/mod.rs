//! Query Construction
//!
//! Everything that ends up in a log query passes through this module: the
//! sanitizer validates each parameter and the template registry renders the
//! canonical KQL templates.

pub mod sanitizer;
pub mod templates;

use thiserror::Error;

pub use sanitizer::{validate, MAX_PARAMETER_LENGTH};
pub use templates::{
    params, SanitizedQuery, TemplateDescriptor, TemplateKey, TemplateParams, TemplateRegistry,
    ALIAS_TABLE, ALIAS_TABLE_VERSION,
};

/// A value or template request that must not reach the log backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("value is empty")]
    Empty,
    #[error("value is {0} characters long (max {max})", max = MAX_PARAMETER_LENGTH)]
    TooLong(usize),
    #[error("value contains forbidden sequence {0:?}")]
    ForbiddenSequence(&'static str),
    #[error("value contains disallowed character {0:?}")]
    InvalidCharacter(char),
    #[error("unknown template key: {0}")]
    UnknownTemplate(String),
    #[error("template {template} is missing required parameter {parameter}")]
    MissingParameter {
        template: &'static str,
        parameter: &'static str,
    },
    #[error("failed to render template {template}: {message}")]
    Render {
        template: &'static str,
        message: String,
    },
}
