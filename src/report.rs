//! Test reports
//!
//! Every test entry point produces a [`TestReport`]. Reports are rendered as
//! human readable text or as JSON.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::{Result, SchemaError, TestKind};
use crate::key::Key;
use crate::validator::ValidationFailure;

/// A test document that did not behave as its directory says it should
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestFailure {
    #[error("pass document {path:?} was rejected by {key}: {reason}")]
    PassTestFailed {
        key: Key,
        path: PathBuf,
        reason: ValidationFailure,
    },

    #[error("fail document {path:?} was accepted by {key}")]
    FailTestPassed { key: Key, path: PathBuf },
}

/// Outcome of checking one document against one schema
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    /// Schema the document was validated against
    pub schema: Key,
    /// Schema whose test directory the document belongs to
    pub owner: Key,
    pub path: PathBuf,
    pub expect: TestKind,
    pub failure: Option<TestFailure>,
}

impl DocumentResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// A schema that could not be tested at all
#[derive(Debug, Clone, Serialize)]
pub struct SchemaErrorEntry {
    pub key: Key,
    pub message: String,
}

/// Aggregated results of a test run
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub generated_at: DateTime<Utc>,
    pub schemas: Vec<Key>,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<DocumentResult>,
    pub errors: Vec<SchemaErrorEntry>,
}

impl Default for TestReport {
    fn default() -> Self {
        Self::new()
    }
}

impl TestReport {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            schemas: Vec::new(),
            passed: 0,
            failed: 0,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, result: DocumentResult) {
        if result.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn record_error(&mut self, key: &Key, error: &SchemaError) {
        self.errors.push(SchemaErrorEntry {
            key: key.clone(),
            message: error.to_string(),
        });
    }

    pub fn merge(&mut self, other: TestReport) {
        self.schemas.extend(other.schemas);
        self.passed += other.passed;
        self.failed += other.failed;
        self.results.extend(other.results);
        self.errors.extend(other.errors);
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestFailure> {
        self.results.iter().filter_map(|r| r.failure.as_ref())
    }
}

/// Output shape of a report
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Write `report` to `sink` in the given format
pub fn write_report(report: &TestReport, format: ReportFormat, sink: &mut dyn Write) -> Result<()> {
    let io = |e| SchemaError::Io {
        path: PathBuf::from("<report>"),
        source: e,
    };
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *sink, report)?;
            writeln!(sink).map_err(io)?;
        }
        ReportFormat::Text => write_text(report, sink).map_err(io)?,
    }
    Ok(())
}

fn write_text(report: &TestReport, sink: &mut dyn Write) -> std::io::Result<()> {
    for result in &report.results {
        match &result.failure {
            None => writeln!(
                sink,
                "  ✅ {} {} ({})",
                result.schema,
                result.path.display(),
                result.expect
            )?,
            Some(failure) => writeln!(sink, "  ❌ {}", failure)?,
        }
    }
    for error in &report.errors {
        writeln!(sink, "  ❌ {}: {}", error.key, error.message)?;
    }

    writeln!(sink)?;
    writeln!(
        sink,
        "Summary: {} schema(s), {} passed, {} failed, {} error(s)",
        report.schemas.len(),
        report.passed,
        report.failed,
        report.errors.len()
    )?;
    if report.is_success() {
        writeln!(sink, "✅ All tests passed")?;
    } else {
        writeln!(sink, "❌ Tests failed")?;
    }
    Ok(())
}
