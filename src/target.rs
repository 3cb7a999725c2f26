//! Target resolution
//!
//! Commands accept one free-form target argument. It can be a key, a
//! canonical URL, a path inside the registry, a scope, or `all`; explicit
//! `--key`, `--id` and `--scope` overrides take precedence over it in that
//! order.

use std::fs;
use std::path::Path;

use url::Url;

use crate::error::{Result, SchemaError};
use crate::key::{Key, SearchScope, KEY_SEPARATOR, SCHEMA_SUFFIX};
use crate::registry::Registry;

/// Argument meaning "the whole registry"
pub const ALL: &str = "all";

/// What a command should operate on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Key(Key),
    Scope(SearchScope),
}

/// Resolves user input into a [`Target`]
#[derive(Debug)]
pub struct TargetResolver<'r> {
    registry: &'r Registry,
    arg: Option<String>,
    key: Option<Key>,
    id: Option<Key>,
    scope: Option<SearchScope>,
}

impl<'r> TargetResolver<'r> {
    pub fn new(registry: &'r Registry, arg: Option<&str>) -> Self {
        Self {
            registry,
            arg: arg.map(str::to_string),
            key: None,
            id: None,
            scope: None,
        }
    }

    /// Explicit key override
    pub fn set_key(&mut self, key: &str) -> Result<&mut Self> {
        self.key = Some(Key::parse(key)?);
        Ok(self)
    }

    /// Explicit canonical id override
    pub fn set_id(&mut self, id: &str) -> Result<&mut Self> {
        if !looks_like_url(id) {
            return Err(SchemaError::InvalidUrl {
                property: "id".to_string(),
                url: id.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        self.id = Some(key_from_id(id)?);
        Ok(self)
    }

    /// Explicit scope override
    pub fn set_scope(&mut self, scope: &str) -> Result<&mut Self> {
        self.scope = Some(SearchScope::new(scope)?);
        Ok(self)
    }

    /// Apply the override priority, then infer from the positional argument
    pub fn resolve(&self) -> Result<Target> {
        if let Some(key) = &self.key {
            return Ok(Target::Key(key.clone()));
        }
        if let Some(key) = &self.id {
            return Ok(Target::Key(key.clone()));
        }
        if let Some(scope) = &self.scope {
            return Ok(Target::Scope(scope.clone()));
        }
        match &self.arg {
            Some(arg) => self.infer(arg),
            None => Err(SchemaError::NoSchemaTargets),
        }
    }

    /// Resolve to exactly one key; scopes must match a single schema
    pub fn resolve_single_key(&self) -> Result<Key> {
        match self.resolve()? {
            Target::Key(key) => Ok(key),
            Target::Scope(scope) => self.resolve_scope_to_single_key(&scope),
        }
    }

    pub fn resolve_scope_to_single_key(&self, scope: &SearchScope) -> Result<Key> {
        let mut keys = self.registry.find_keys(scope)?;
        match keys.len() {
            0 => Err(SchemaError::NotFound {
                target: scope.to_string(),
            }),
            1 => Ok(keys.remove(0)),
            count => Err(SchemaError::TargetArgumentTargetsMultipleSchemas {
                scope: scope.to_string(),
                count,
            }),
        }
    }

    fn infer(&self, arg: &str) -> Result<Target> {
        let trimmed = arg.trim();
        if trimmed.is_empty() || trimmed == ALL {
            return Ok(Target::Scope(SearchScope::root()));
        }

        if looks_like_url(trimmed) {
            return Ok(Target::Key(key_from_id(trimmed)?));
        }

        if trimmed.contains(KEY_SEPARATOR) && !looks_like_path(trimmed) {
            return Ok(Target::Key(Key::parse(trimmed)?));
        }

        let path = Path::new(trimmed);
        if path.exists() {
            return self.from_path(path);
        }

        Ok(Target::Scope(SearchScope::new(trimmed)?))
    }

    fn from_path(&self, path: &Path) -> Result<Target> {
        let canonical = fs::canonicalize(path).map_err(SchemaError::io(path))?;
        let root = self.registry.root();
        let relative = canonical
            .strip_prefix(root)
            .map_err(|_| SchemaError::LocationOutsideRootDirectory {
                path: canonical.clone(),
                root: root.to_path_buf(),
            })?;

        if canonical.is_dir() {
            return Ok(Target::Scope(SearchScope::from_relative_path(relative)?));
        }
        Ok(Target::Key(Key::from_path(&canonical)?))
    }
}

fn looks_like_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn looks_like_path(s: &str) -> bool {
    s.contains('/') || s.contains(std::path::MAIN_SEPARATOR) || s.contains('.')
}

/// Key named by the last segment of a canonical schema URL
pub fn key_from_id(id: &str) -> Result<Key> {
    let not_a_schema = || SchemaError::NotASchemaFile { path: id.to_string() };
    let url = Url::parse(id).map_err(|_| not_a_schema())?;
    let filename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| name.ends_with(SCHEMA_SUFFIX))
        .ok_or_else(not_a_schema)?;
    Key::from_filename(filename)
}
