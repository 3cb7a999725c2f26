//! Schema test engine
//!
//! Each schema version has two test directories next to its document:
//! `pass/` holds JSON documents the schema must accept, `fail/` documents it
//! must reject.
//!
//! The consumer-breaking sweep extends this across a major line: every `pass`
//! document of a lower version must still be accepted by every higher version
//! with the same major. Testing a version therefore runs earlier versions'
//! `pass` documents against it, and its own `pass` documents against each
//! later version.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SchemaError, TestKind};
use crate::key::{Key, SearchScope};
use crate::registry::Registry;
use crate::report::{DocumentResult, TestFailure, TestReport};
use crate::validator::CompiledSchema;

/// Which checks a test run performs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TestScope {
    /// The schema's own `pass` and `fail` documents
    Local,
    /// Only `pass` documents
    Pass,
    /// Only `fail` documents
    Fail,
    /// Only the sweep across sibling versions
    ConsumerBreaking,
    /// Local tests plus the sibling sweep
    #[default]
    All,
}

impl TestScope {
    fn runs_pass(self) -> bool {
        matches!(self, TestScope::Local | TestScope::Pass | TestScope::All)
    }

    fn runs_fail(self) -> bool {
        matches!(self, TestScope::Local | TestScope::Fail | TestScope::All)
    }

    fn runs_sweep(self) -> bool {
        matches!(self, TestScope::ConsumerBreaking | TestScope::All)
    }
}

/// Runs test documents against schemas for one environment
#[derive(Debug)]
pub struct Tester<'r> {
    registry: &'r Registry,
    env: String,
    stop_on_first_error: bool,
    scope: TestScope,
    skip_compatibility: bool,
}

impl<'r> Tester<'r> {
    /// Test against the production environment's URLs
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            env: registry.config().production_env().name.clone(),
            registry,
            stop_on_first_error: true,
            scope: TestScope::All,
            skip_compatibility: false,
        }
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    pub fn stop_on_first_error(mut self, stop: bool) -> Self {
        self.stop_on_first_error = stop;
        self
    }

    pub fn scope(mut self, scope: TestScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn skip_compatibility(mut self, skip: bool) -> Self {
        self.skip_compatibility = skip;
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Run the configured checks for one schema
    pub fn test_single_schema(&self, key: &Key) -> Result<TestReport> {
        let schema = self.registry.get_schema_by_key(key)?;
        let compiled = self.registry.compile(&schema, &self.env)?;

        let mut report = TestReport::new();
        report.schemas.push(key.clone());

        let compiled = compiled.as_ref();
        if self.scope.runs_pass()
            && !self.run_dir(key, key, compiled, TestKind::Pass, &mut report)?
        {
            return Ok(report);
        }
        if self.scope.runs_fail()
            && !self.run_dir(key, key, compiled, TestKind::Fail, &mut report)?
        {
            return Ok(report);
        }
        if self.scope.runs_sweep() && !self.skip_compatibility {
            self.sweep(key, compiled, &mut report)?;
        }

        debug!(%key, passed = report.passed, failed = report.failed, "tested schema");
        Ok(report)
    }

    /// Test every schema under `scope`
    pub fn test_found_schemas(&self, scope: &SearchScope) -> Result<TestReport> {
        let keys = self.registry.find_keys(scope)?;
        info!(scope = %scope, schemas = keys.len(), "testing schemas");

        let mut report = TestReport::new();
        for key in &keys {
            match self.test_single_schema(key) {
                Ok(single) => {
                    let failed = !single.is_success();
                    report.merge(single);
                    if failed && self.stop_on_first_error {
                        break;
                    }
                }
                Err(e) if self.stop_on_first_error => return Err(e),
                Err(e) => {
                    report.schemas.push(key.clone());
                    report.record_error(key, &e);
                }
            }
        }
        Ok(report)
    }

    /// Validate one test document against `key`
    ///
    /// The expectation comes from the document's directory (`pass` or `fail`).
    pub fn test_specific_document(&self, key: &Key, path: &Path) -> Result<TestReport> {
        let expect = match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            Some("pass") => TestKind::Pass,
            Some("fail") => TestKind::Fail,
            _ => {
                return Err(SchemaError::NotATestDocument {
                    path: path.to_path_buf(),
                })
            }
        };

        let schema = self.registry.get_schema_by_key(key)?;
        let compiled = self.registry.compile(&schema, &self.env)?;

        let mut report = TestReport::new();
        report.schemas.push(key.clone());
        report.record(check_document(key, key, compiled.as_ref(), path, expect)?);
        Ok(report)
    }

    fn sweep(
        &self,
        key: &Key,
        compiled: &dyn CompiledSchema,
        report: &mut TestReport,
    ) -> Result<()> {
        for earlier in self.registry.earlier_versions(key)? {
            debug!(%key, %earlier, "checking earlier pass documents");
            if !self.run_dir(&earlier, key, compiled, TestKind::Pass, report)? {
                return Ok(());
            }
        }

        for future in self.registry.future_versions(key)? {
            debug!(%key, %future, "checking pass documents against later version");
            let schema = self.registry.get_schema_by_key(&future)?;
            let future_compiled = self.registry.compile(&schema, &self.env)?;
            if !self.run_dir(key, &future, future_compiled.as_ref(), TestKind::Pass, report)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Check the documents in `owner`'s `kind` directory against `against`
    ///
    /// Returns `false` when the run should stop.
    fn run_dir(
        &self,
        owner: &Key,
        against: &Key,
        compiled: &dyn CompiledSchema,
        kind: TestKind,
        report: &mut TestReport,
    ) -> Result<bool> {
        let dir = self.registry.test_dir(owner, kind);
        if !dir.is_dir() {
            return Err(SchemaError::TestDirMissing {
                key: owner.to_string(),
                kind,
            });
        }

        for path in test_documents(&dir)? {
            let result = check_document(owner, against, compiled, &path, kind)?;
            let failed = !result.passed();
            report.record(result);
            if failed && self.stop_on_first_error {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `.json` files directly inside `dir`, sorted
fn test_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(SchemaError::io(dir))? {
        let path = entry.map_err(SchemaError::io(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_test_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::CannotReadTestDocument {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SchemaError::InvalidTestDocument {
        path: path.to_path_buf(),
        source,
    })
}

fn check_document(
    owner: &Key,
    against: &Key,
    compiled: &dyn CompiledSchema,
    path: &Path,
    expect: TestKind,
) -> Result<DocumentResult> {
    let document = load_test_document(path)?;

    let failure = match (expect, compiled.validate(&document)) {
        (TestKind::Pass, Ok(())) | (TestKind::Fail, Err(_)) => None,
        (TestKind::Pass, Err(reason)) => Some(TestFailure::PassTestFailed {
            key: against.clone(),
            path: path.to_path_buf(),
            reason,
        }),
        (TestKind::Fail, Ok(())) => Some(TestFailure::FailTestPassed {
            key: against.clone(),
            path: path.to_path_buf(),
        }),
    };

    Ok(DocumentResult {
        schema: against.clone(),
        owner: owner.clone(),
        path: path.to_path_buf(),
        expect,
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationFailure;
    use serde_json::json;

    struct RequiresName;

    impl CompiledSchema for RequiresName {
        fn validate(&self, document: &Value) -> std::result::Result<(), ValidationFailure> {
            if document.get("name").is_some() {
                Ok(())
            } else {
                Err(ValidationFailure {
                    errors: vec!["name is required".to_string()],
                })
            }
        }
    }

    fn key() -> Key {
        Key::parse("acme_widget_1_0_0").unwrap()
    }

    #[test]
    fn test_check_document_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, json!({"name": "x"}).to_string()).unwrap();
        fs::write(&bad, json!({}).to_string()).unwrap();

        let ok = check_document(&key(), &key(), &RequiresName, &good, TestKind::Pass).unwrap();
        assert!(ok.passed());

        let rejected = check_document(&key(), &key(), &RequiresName, &bad, TestKind::Pass).unwrap();
        assert!(matches!(rejected.failure, Some(TestFailure::PassTestFailed { .. })));

        let accepted =
            check_document(&key(), &key(), &RequiresName, &good, TestKind::Fail).unwrap();
        assert!(matches!(accepted.failure, Some(TestFailure::FailTestPassed { .. })));

        assert!(check_document(&key(), &key(), &RequiresName, &bad, TestKind::Fail)
            .unwrap()
            .passed());
    }

    #[test]
    fn test_bad_test_documents() {
        let dir = tempfile::tempdir().unwrap();
        let malformed = dir.path().join("malformed.json");
        fs::write(&malformed, "{ nope").unwrap();
        assert!(matches!(
            check_document(&key(), &key(), &RequiresName, &malformed, TestKind::Pass),
            Err(SchemaError::InvalidTestDocument { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            check_document(&key(), &key(), &RequiresName, &missing, TestKind::Pass),
            Err(SchemaError::CannotReadTestDocument { .. })
        ));
    }

    #[test]
    fn test_documents_are_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "notes.txt"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let names: Vec<_> = test_documents(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.json", "b.json"]);
    }

    #[test]
    fn test_scope_selection() {
        assert!(TestScope::Local.runs_pass() && TestScope::Local.runs_fail());
        assert!(!TestScope::Local.runs_sweep());
        assert!(TestScope::Pass.runs_pass() && !TestScope::Pass.runs_fail());
        assert!(!TestScope::ConsumerBreaking.runs_pass());
        assert!(TestScope::ConsumerBreaking.runs_sweep());
        assert!(TestScope::All.runs_pass() && TestScope::All.runs_fail());
        assert!(TestScope::All.runs_sweep());
    }
}
