//! Test report: outcome of one scraper execution under `--limit 5`.
//!
//! Same wire/internal split as the recon report: the wire form keeps the
//! structured-output validator happy (no optionality, records as JSON
//! strings, coverage as an entry list); the internal form is what the
//! driver stores in `PipelineState.testResults`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::OutputSchema;

/// Exit code reserved for the scraper-test tool's execution timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Max sample records carried in a report.
pub const MAX_SAMPLE_RECORDS: usize = 3;

// ── Wire form ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaErrorWire {
    #[serde(default)]
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldCoverageWire {
    pub field: String,
    /// Percentage of extracted records in which the field was non-empty.
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestReportWire {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub record_count: u32,
    pub duration_ms: u64,
    pub schema_errors: Vec<SchemaErrorWire>,
    /// Up to three extracted records, each as a JSON string.
    pub sample_records: Vec<String>,
    pub field_coverage: Vec<FieldCoverageWire>,
    pub stdout: String,
    pub stderr: String,
}

// ── Internal form ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaError {
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub record_count: u32,
    pub duration_ms: u64,
    pub schema_errors: Vec<SchemaError>,
    pub sample_records: Vec<Value>,
    pub field_coverage: BTreeMap<String, u8>,
    pub stdout: String,
    pub stderr: String,
}

impl TestReport {
    pub fn from_wire(wire: TestReportWire) -> Self {
        Self {
            success: wire.success,
            exit_code: wire.exit_code,
            timed_out: wire.timed_out,
            record_count: wire.record_count,
            duration_ms: wire.duration_ms,
            schema_errors: wire
                .schema_errors
                .into_iter()
                .map(|e| SchemaError {
                    path: e.path,
                    message: e.message,
                })
                .collect(),
            sample_records: wire
                .sample_records
                .into_iter()
                .take(MAX_SAMPLE_RECORDS)
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
                .collect(),
            field_coverage: wire
                .field_coverage
                .into_iter()
                .map(|entry| (entry.field, entry.percent.min(100)))
                .collect(),
            stdout: wire.stdout,
            stderr: wire.stderr,
        }
    }

    pub fn to_wire(&self) -> TestReportWire {
        TestReportWire {
            success: self.success,
            exit_code: self.exit_code,
            timed_out: self.timed_out,
            record_count: self.record_count,
            duration_ms: self.duration_ms,
            schema_errors: self
                .schema_errors
                .iter()
                .map(|e| SchemaErrorWire {
                    path: e.path.clone(),
                    message: e.message.clone(),
                })
                .collect(),
            sample_records: self
                .sample_records
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            field_coverage: self
                .field_coverage
                .iter()
                .map(|(field, percent)| FieldCoverageWire {
                    field: field.clone(),
                    percent: *percent,
                })
                .collect(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    /// One-line summary for events and the debug log.
    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "{} records extracted in {}ms",
                self.record_count, self.duration_ms
            )
        } else if self.timed_out {
            format!("timed out after {}ms (exit {})", self.duration_ms, self.exit_code)
        } else {
            format!(
                "failed with exit {} ({} schema errors, {} records)",
                self.exit_code,
                self.schema_errors.len(),
                self.record_count
            )
        }
    }
}

// ── Structured-output schema ───────────────────────────────────────────

pub fn test_report_schema() -> OutputSchema {
    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "success", "exitCode", "timedOut", "recordCount", "durationMs",
            "schemaErrors", "sampleRecords", "fieldCoverage", "stdout", "stderr"
        ],
        "properties": {
            "success": { "type": "boolean" },
            "exitCode": { "type": "integer" },
            "timedOut": { "type": "boolean" },
            "recordCount": { "type": "integer", "minimum": 0 },
            "durationMs": { "type": "integer", "minimum": 0 },
            "schemaErrors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["path", "message"],
                    "properties": {
                        "path": { "type": ["string", "null"] },
                        "message": { "type": "string" }
                    }
                }
            },
            "sampleRecords": {
                "type": "array",
                "maxItems": 3,
                "items": { "type": "string" }
            },
            "fieldCoverage": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["field", "percent"],
                    "properties": {
                        "field": { "type": "string" },
                        "percent": { "type": "integer", "minimum": 0, "maximum": 100 }
                    }
                }
            },
            "stdout": { "type": "string" },
            "stderr": { "type": "string" }
        }
    });

    OutputSchema {
        name: "test_report",
        schema,
    }
}
