//! Shared fixtures: throw-away registries on disk

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use json_schema_manager::config::CONFIG_FILENAME;
use json_schema_manager::{Key, Registry, TestKind};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const PRIVATE_ROOT: &str = "https://schemas.internal.example.com";
pub const PUBLIC_ROOT: &str = "https://schemas.example.com";

pub const CONFIG: &str = r#"
defaultJsonSchemaVersion: https://json-schema.org/draft/2020-12/schema
environments:
  prod:
    privateUrlRoot: https://schemas.internal.example.com/
    publicUrlRoot: https://schemas.example.com
    isProduction: true
  staging:
    privateUrlRoot: https://staging.internal.example.com
    publicUrlRoot: https://staging.example.com
    allowSchemaMutation: true
"#;

/// A registry in a temporary directory, removed on drop
pub struct Fixture {
    pub dir: TempDir,
    pub registry: Registry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CONFIG)
    }

    pub fn with_config(config: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), config).unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        Self { dir, registry }
    }

    /// Write `source` as the document for `key`, with empty test directories
    pub fn write_schema(&self, key: &str, source: &str) -> Key {
        let key = Key::parse(key).unwrap();
        let path = self.registry.schema_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        for kind in [TestKind::Pass, TestKind::Fail] {
            fs::create_dir_all(self.registry.test_dir(&key, kind)).unwrap();
        }
        key
    }

    pub fn write_json_schema(&self, key: &str, document: Value) -> Key {
        self.write_schema(key, &serde_json::to_string_pretty(&document).unwrap())
    }

    pub fn write_test_doc(
        &self,
        key: &Key,
        kind: TestKind,
        name: &str,
        document: Value,
    ) -> PathBuf {
        let path = self.registry.test_dir(key, kind).join(name);
        fs::write(&path, document.to_string()).unwrap();
        path
    }

    /// Remove every test document of `key` of the given kind
    pub fn clear_test_docs(&self, key: &Key, kind: TestKind) {
        let dir = self.registry.test_dir(key, kind);
        fs::remove_dir_all(&dir).unwrap();
        fs::create_dir_all(&dir).unwrap();
    }
}

/// Object schema requiring `required` properties
pub fn object_schema(required: &[&str]) -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "{{ ID }}",
        "type": "object",
        "required": required,
    })
}
