//! Query Parameter Sanitizer
//!
//! Every fragment interpolated into a log query is checked here first. The
//! accepted alphabet cannot terminate a KQL string literal, start a new
//! pipeline stage, or open a comment, so valid input is returned unchanged.

use lazy_static::lazy_static;
use regex::Regex;

use super::ValidationError;

/// Maximum accepted parameter length, in characters.
pub const MAX_PARAMETER_LENGTH: usize = 256;

/// Sequences rejected outright, checked before the alphabet so the error
/// names the offending construct.
const FORBIDDEN_SEQUENCES: [&str; 7] = ["\n", "\r", "|", "\\", "//", "/*", "*/"];

lazy_static! {
    static ref ALLOWED: Regex = Regex::new(r"^[A-Za-z0-9_./ -]+$").unwrap();
}

/// Validate a template parameter. Returns the input unchanged when it is
/// safe to embed in a query.
pub fn validate(value: &str) -> Result<&str, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }

    let length = value.chars().count();
    if length > MAX_PARAMETER_LENGTH {
        return Err(ValidationError::TooLong(length));
    }

    if let Some(sequence) = FORBIDDEN_SEQUENCES.iter().copied().find(|s| value.contains(s)) {
        return Err(ValidationError::ForbiddenSequence(sequence));
    }

    if !ALLOWED.is_match(value) {
        let offending = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.' | '/' | ' ')))
            .unwrap_or('?');
        return Err(ValidationError::InvalidCharacter(offending));
    }

    Ok(value)
}
