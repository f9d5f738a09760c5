//! Turning gateway results and failures into evidence steps.

use serde_json::Value;
use tracing::warn;

use crate::gateway::{GatewayError, QueryResult, QueryRow, QueryStatus};
use crate::metrics::GATEWAY_ERRORS_TOTAL;

/// Recorded in place of a query that failed sanitization.
pub const CONFIG_ERROR_STEP: &str = "Agent Configuration Error: invalid resource identifier";

/// Rows kept per query step.
pub const MAX_EVIDENCE_ROWS: usize = 10;

/// Record a gateway failure as a step. Timeouts read `Error fetching X: timeout`.
pub fn gateway_error_step(gateway: &'static str, what: &str, err: &GatewayError) -> String {
    GATEWAY_ERRORS_TOTAL.with_label_values(&[gateway, err.kind()]).inc();
    warn!("{} gateway call for {} failed: {}", gateway, what, err);
    format!("Error fetching {}: {}", what, err)
}

/// A query result as evidence, whatever its status.
pub fn query_step(label: &str, result: &QueryResult) -> String {
    let header = match (result.status, result.error.as_deref()) {
        (QueryStatus::Failure, error) => {
            return format!("{}: Failure ({})", label, error.unwrap_or("no error detail"));
        }
        (QueryStatus::PartialFailure, error) => format!(
            "{}: PartialFailure ({}), {}",
            label,
            error.unwrap_or("no error detail"),
            row_count(result.rows.len())
        ),
        (QueryStatus::Success, _) => format!("{}: Success, {}", label, row_count(result.rows.len())),
    };

    let mut lines = vec![header];
    lines.extend(result.rows.iter().take(MAX_EVIDENCE_ROWS).map(|row| format!("    {}", format_row(row))));
    if result.rows.len() > MAX_EVIDENCE_ROWS {
        lines.push(format!("    ... {} more", result.rows.len() - MAX_EVIDENCE_ROWS));
    }
    lines.join("\n")
}

fn row_count(n: usize) -> String {
    match n {
        0 => "no rows".to_string(),
        1 => "1 row".to_string(),
        n => format!("{} rows", n),
    }
}

/// `column=value` pairs, skipping nulls.
pub fn format_row(row: &QueryRow) -> String {
    row.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(column, value)| match value {
            Value::String(s) => format!("{}={}", column, s),
            other => format!("{}={}", column, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> QueryRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_timeout_step_wording() {
        let step = gateway_error_step("logs", "container_logs", &GatewayError::Timeout);
        assert_eq!(step, "Error fetching container_logs: timeout");
    }

    #[test]
    fn test_failure_is_recorded_verbatim() {
        let result = QueryResult::failure("BadArgumentError: table not found");
        assert_eq!(
            query_step("impact_analysis", &result),
            "impact_analysis: Failure (BadArgumentError: table not found)"
        );
    }

    #[test]
    fn test_success_lists_rows() {
        let result = QueryResult::success(vec![row(&[
            ("Log_s", json!("OOMKilled")),
            ("Replica", Value::Null),
            ("Restarts", json!(3)),
        ])]);
        assert_eq!(
            query_step("container_logs", &result),
            "container_logs: Success, 1 row\n    Log_s=OOMKilled, Restarts=3"
        );
    }

    #[test]
    fn test_rows_are_capped() {
        let rows = (0..15).map(|i| row(&[("n", json!(i))])).collect();
        let step = query_step("recent_changes", &QueryResult::partial(rows, "truncated"));

        assert!(step.starts_with("recent_changes: PartialFailure (truncated), 15 rows"));
        assert_eq!(step.lines().count(), 1 + MAX_EVIDENCE_ROWS + 1);
        assert!(step.ends_with("... 5 more"));
    }
}
