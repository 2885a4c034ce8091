//! JSON output formatting

use crate::output::formatter::CommandReport;
use serde_json::{json, Value};

pub fn format_json(report: &CommandReport) -> String {
    let mut data: Value = serde_json::to_value(&report.result).unwrap_or(json!(null));
    if !report.diagnostics.is_empty() {
        if let Value::Object(ref mut map) = data {
            map.insert(
                "diagnostics".to_string(),
                serde_json::to_value(&report.diagnostics).unwrap_or(json!([])),
            );
        }
    }

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_string())
}
