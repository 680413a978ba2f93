use crate::emit::{ReportError, ReportErrorKind};
use crate::runner::report::TestRunReport;

/// Emit test run results as YAML.
///
/// # Errors
///
/// Returns [`ReportError`] if the report cannot be serialized.
pub fn emit_run_yaml(report: &TestRunReport) -> Result<String, ReportError> {
    serde_yaml::to_string(report).map_err(|e| serialize_error("yaml", &e))
}

/// Emit test run results as JSON.
///
/// # Errors
///
/// Returns [`ReportError`] if the report cannot be serialized.
pub fn emit_run_json(report: &TestRunReport) -> Result<String, ReportError> {
    serde_json::to_string_pretty(report)
        .map(|mut json| {
            json.push('\n');
            json
        })
        .map_err(|e| serialize_error("json", &e))
}

fn serialize_error(format: &str, e: &dyn std::error::Error) -> ReportError {
    ReportError {
        kind: ReportErrorKind::Serialize,
        message: format!("failed to serialize {format} report: {e}"),
        detail: None,
    }
}
