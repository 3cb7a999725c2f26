//! Schema documents

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::key::Key;
use crate::render::{RenderInfo, Template};
use crate::validator::Draft;

/// Visibility flag read from the document root
pub const X_PUBLIC: &str = "x-public";

/// One versioned schema document
#[derive(Debug)]
pub struct Schema {
    key: Key,
    path: PathBuf,
    exists: bool,
    source: String,
    is_public: bool,
    /// Parsed once at load; format errors surface when rendering
    template: std::result::Result<Template, String>,
    renders: RefCell<HashMap<String, Rc<RenderInfo>>>,
}

impl Schema {
    /// Load the document for `key` from a registry rooted at `root`
    pub fn load(root: &Path, key: &Key) -> Result<Self> {
        let path = root.join(key.relative_path());
        if !path.is_file() {
            return Err(SchemaError::SchemaNotFound {
                key: key.to_string(),
                path,
            });
        }
        let source = fs::read_to_string(&path).map_err(SchemaError::io(&path))?;
        Self::from_source(key.clone(), path, source, true)
    }

    /// A new, not yet written document for the first version of a family
    pub fn initial(root: &Path, key: &Key, draft: Draft) -> Result<Self> {
        let document = serde_json::json!({
            "$schema": draft.url(),
            "$id": "{{ ID }}",
            "title": key.family(),
            "type": "object",
        });
        let source = serde_json::to_string_pretty(&document)?;
        Self::from_source(key.clone(), root.join(key.relative_path()), source, false)
    }

    fn from_source(key: Key, path: PathBuf, source: String, exists: bool) -> Result<Self> {
        let document: Value =
            serde_json::from_str(&source).map_err(|source| SchemaError::InvalidJson {
                path: path.clone(),
                source,
            })?;

        let is_public = match document.get(X_PUBLIC) {
            None => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(SchemaError::CannotReadXPublic {
                    key: key.to_string(),
                })
            }
        };

        let template = Template::parse(&source);

        Ok(Self {
            key,
            path,
            exists,
            source,
            is_public,
            template,
            renders: RefCell::new(HashMap::new()),
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Absolute location of the document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the document and its `pass`/`fail` directories
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// Whether the document was read from disk
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Raw source, directives included
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub(crate) fn template(&self) -> Result<&Template> {
        self.template.as_ref().map_err(|reason| SchemaError::TemplateFormat {
            key: self.key.to_string(),
            reason: reason.clone(),
        })
    }

    pub(crate) fn cached_render(&self, env: &str) -> Option<Rc<RenderInfo>> {
        self.renders.borrow().get(env).cloned()
    }

    pub(crate) fn store_render(&self, env: &str, info: Rc<RenderInfo>) {
        self.renders.borrow_mut().insert(env.to_string(), info);
    }

    /// Write the document into `dir` under its key's file name
    pub(crate) fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.key.filename());
        fs::write(&path, &self.source).map_err(SchemaError::io(&path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_schema(root: &Path, key: &Key, content: &str) {
        let path = root.join(key.relative_path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_schema() {
        let dir = tempdir().unwrap();
        let key = Key::parse("acme_widget_1_0_0").unwrap();
        write_schema(dir.path(), &key, r#"{"$id": "{{ ID }}", "x-public": true}"#);

        let schema = Schema::load(dir.path(), &key).unwrap();
        assert!(schema.exists());
        assert!(schema.is_public());
        assert!(schema.template().is_ok());
    }

    #[test]
    fn test_x_public_defaults_to_private() {
        let dir = tempdir().unwrap();
        let key = Key::parse("acme_widget_1_0_0").unwrap();
        write_schema(dir.path(), &key, r#"{"type": "object"}"#);
        assert!(!Schema::load(dir.path(), &key).unwrap().is_public());
    }

    #[test]
    fn test_x_public_must_be_boolean() {
        let dir = tempdir().unwrap();
        let key = Key::parse("acme_widget_1_0_0").unwrap();
        write_schema(dir.path(), &key, r#"{"x-public": "yes"}"#);
        assert!(matches!(
            Schema::load(dir.path(), &key),
            Err(SchemaError::CannotReadXPublic { .. })
        ));
    }

    #[test]
    fn test_missing_and_invalid_documents() {
        let dir = tempdir().unwrap();
        let key = Key::parse("acme_widget_1_0_0").unwrap();
        assert!(matches!(
            Schema::load(dir.path(), &key),
            Err(SchemaError::SchemaNotFound { .. })
        ));

        write_schema(dir.path(), &key, "{ not json");
        assert!(matches!(
            Schema::load(dir.path(), &key),
            Err(SchemaError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_initial_document() {
        let dir = tempdir().unwrap();
        let key = Key::parse("acme_widget_1_0_0").unwrap();
        let schema = Schema::initial(dir.path(), &key, Draft::Draft7).unwrap();
        assert!(!schema.exists());
        assert!(!schema.is_public());
        assert!(schema.source().contains("{{ ID }}"));
        assert!(schema.source().contains("draft-07"));
    }
}
