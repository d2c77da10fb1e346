//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report containing the summary statistics,
//! the resolved config for reproducibility, and the per-call detail log.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::loadtest::config::{LoadTestConfig, CONFIG_DIR};
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{CallLog, CallRecord, MetricsSummary};

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport<'a> {
    /// Report format version for parser compatibility.
    pub schema_version: &'static str,
    /// ISO-8601 timestamp when the report was generated.
    pub timestamp: String,
    /// Target MCP server URL that was tested.
    pub target_url: &'a str,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: &'a LoadTestConfig,
    /// Aggregate and per-tool statistics.
    pub summary: &'a MetricsSummary,
    /// Every attempted call, in order.
    pub calls: &'a [CallRecord],
}

impl<'a> LoadTestReport<'a> {
    /// Build a report for one finished run.
    pub fn new(summary: &'a MetricsSummary, config: &'a LoadTestConfig, calls: &'a CallLog, url: &'a str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: url,
            config,
            summary,
            calls: calls.records(),
        }
    }
}

/// Write a JSON report file to the `.loadtest/reports/` directory under
/// `base_dir`, creating it if needed. Returns the written path.
pub fn write_report(report: &LoadTestReport<'_>, base_dir: &Path) -> Result<PathBuf, LoadTestError> {
    let reports_dir = base_dir.join(CONFIG_DIR).join("reports");
    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let io_err = |message: String| LoadTestError::Report {
        path: report_path.display().to_string(),
        message,
    };

    std::fs::create_dir_all(&reports_dir).map_err(|e| io_err(e.to_string()))?;
    let json = serde_json::to_string_pretty(report).map_err(|e| io_err(e.to_string()))?;
    std::fs::write(&report_path, json).map_err(|e| io_err(e.to_string()))?;

    Ok(report_path)
}

/// Generate the report filename for a given timestamp.
///
/// Uses hyphens instead of colons for cross-platform filename compatibility.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}
