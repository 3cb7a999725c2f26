//! Schema Registry
//!
//! Owns a registry root on disk, its configuration and the validation
//! capability. Schemas are loaded once per key and cached until [`Registry::reset`].
//!
//! Directory structure: `{domain...}/{family}/{major}/{minor}/{patch}/{key}.schema.json`
//! with `pass/` and `fail/` test directories next to each document.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use semver::Version;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, SchemaError, TestKind};
use crate::key::{Key, SearchScope, SCHEMA_SUFFIX};
use crate::render::{RenderInfo, Renderer};
use crate::schema::Schema;
use crate::validator::{CompiledSchema, JsonSchemaCompiler, SchemaCompiler};
use crate::version::{self, ReleaseType};

/// Prefix of the scratch directory a new version is assembled in
const STAGING_PREFIX: &str = ".staging-";

/// The main schema registry
pub struct Registry {
    /// Canonical path of the registry root
    root: PathBuf,
    config: Config,
    compiler: RefCell<Box<dyn SchemaCompiler>>,
    /// Loaded schemas by key
    schemas: RefCell<HashMap<Key, Rc<Schema>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("cached_schemas", &self.schemas.borrow().len())
            .finish()
    }
}

impl Registry {
    /// Open a registry backed by the `jsonschema` compiler
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_compiler(root, Box::new(JsonSchemaCompiler::new()))
    }

    /// Open a registry with a custom validation capability
    pub fn with_compiler(
        root: impl AsRef<Path>,
        mut compiler: Box<dyn SchemaCompiler>,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(SchemaError::io(root))?;

        let config = Config::load(&root, &compiler.supported_drafts())?;
        compiler.set_default_draft(config.default_draft());
        info!(root = %root.display(), draft = %config.default_draft(), "opened schema registry");

        Ok(Self {
            root,
            config,
            compiler: RefCell::new(compiler),
            schemas: RefCell::new(HashMap::new()),
        })
    }

    /// Get the root path of the registry
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn compiler(&self) -> Ref<'_, Box<dyn SchemaCompiler>> {
        self.compiler.borrow()
    }

    pub(crate) fn compiler_mut(&self) -> RefMut<'_, Box<dyn SchemaCompiler>> {
        self.compiler.borrow_mut()
    }

    /// Absolute path of the document for `key`
    pub fn schema_path(&self, key: &Key) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Absolute path of the `pass` or `fail` directory for `key`
    pub fn test_dir(&self, key: &Key, kind: TestKind) -> PathBuf {
        self.root.join(key.version_dir()).join(kind.dir_name())
    }

    /// Load a schema, reusing the cached instance when there is one
    pub fn get_schema_by_key(&self, key: &Key) -> Result<Rc<Schema>> {
        if let Some(schema) = self.schemas.borrow().get(key) {
            return Ok(Rc::clone(schema));
        }

        let schema = Rc::new(Schema::load(&self.root, key)?);
        debug!(%key, "loaded schema");
        self.schemas.borrow_mut().insert(key.clone(), Rc::clone(&schema));
        Ok(schema)
    }

    /// Create version `1.0.0` of a new family
    ///
    /// `domain_and_family` is `domain[/domain...]/family`.
    pub fn create_schema(&self, domain_and_family: &str) -> Result<Key> {
        let key = Key::initial(domain_and_family)?;

        let family_dir = self.root.join(key.family_dir());
        if family_dir.exists() {
            if !family_dir.is_dir() || !self.list_version_components(&key, &[])?.is_empty() {
                return Err(SchemaError::AlreadyExists { path: family_dir });
            }
        }

        let schema = Schema::initial(&self.root, &key, self.config.default_draft())?;
        self.install_version(&key, |staging| {
            schema.write_to(staging)?;
            for kind in [TestKind::Pass, TestKind::Fail] {
                let dir = staging.join(kind.dir_name());
                fs::create_dir(&dir).map_err(SchemaError::io(&dir))?;
            }
            Ok(())
        })?;

        info!(%key, "created schema family");
        Ok(key)
    }

    /// Create the next version of `key`'s family by copying `key`
    pub fn create_schema_version(&self, key: &Key, release: ReleaseType) -> Result<Key> {
        let base = self.get_schema_by_key(key)?;

        let next = version::bump_version(key.version(), release, |prefix| {
            self.list_version_components(key, prefix)
        })?;
        let new_key = key.with_version(next);

        let source_dir = base.dir().to_path_buf();
        self.install_version(&new_key, |staging| {
            let target = staging.join(new_key.filename());
            fs::copy(base.path(), &target).map_err(SchemaError::io(base.path()))?;
            for kind in [TestKind::Pass, TestKind::Fail] {
                let from = source_dir.join(kind.dir_name());
                let to = staging.join(kind.dir_name());
                if from.is_dir() {
                    copy_dir(&from, &to)?;
                } else {
                    fs::create_dir(&to).map_err(SchemaError::io(&to))?;
                }
            }
            Ok(())
        })?;

        info!(from = %key, to = %new_key, %release, "created schema version");
        Ok(new_key)
    }

    /// Assemble a version directory in a staging area, then move it into place
    fn install_version<F>(&self, key: &Key, populate: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let target = self.root.join(key.version_dir());
        if target.exists() {
            return Err(SchemaError::AlreadyExists { path: target });
        }

        let family_dir = self.root.join(key.family_dir());
        fs::create_dir_all(&family_dir).map_err(SchemaError::io(&family_dir))?;

        let staging = family_dir.join(format!("{}{}", STAGING_PREFIX, key.version()));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(SchemaError::io(&staging))?;
        }
        fs::create_dir(&staging).map_err(SchemaError::io(&staging))?;

        let installed = populate(&staging).and_then(|()| {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(SchemaError::io(parent))?;
            }
            fs::rename(&staging, &target).map_err(SchemaError::io(&target))
        });

        if installed.is_err() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %e, "could not remove staging directory");
            }
        }
        installed
    }

    /// Numeric version directories one level below `prefix` in `key`'s family
    ///
    /// `[]` lists majors, `[major]` minors, `[major, minor]` patches. A level
    /// that does not exist yet is empty; any other read failure is an error.
    pub fn list_version_components(&self, key: &Key, prefix: &[u64]) -> Result<Vec<u64>> {
        let dir = prefix
            .iter()
            .fold(self.root.join(key.family_dir()), |dir, n| dir.join(n.to_string()));

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SchemaError::Io { path: dir, source: e }),
        };

        let mut values = Vec::new();
        for entry in entries {
            let entry = entry.map_err(SchemaError::io(&dir))?;
            let file_type = entry.file_type().map_err(SchemaError::io(entry.path()))?;
            if !file_type.is_dir() {
                continue;
            }
            if let Some(value) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                values.push(value);
            }
        }
        values.sort_unstable();
        Ok(values)
    }

    /// Keys of lower versions in `key`'s major line, ascending
    pub fn earlier_versions(&self, key: &Key) -> Result<Vec<Key>> {
        let versions = version::earlier_siblings(key.version(), |prefix| {
            self.list_version_components(key, prefix)
        })?;
        Ok(self.existing_keys(key, versions))
    }

    /// Keys of higher versions in `key`'s major line, ascending
    pub fn future_versions(&self, key: &Key) -> Result<Vec<Key>> {
        let versions = version::future_siblings(key.version(), |prefix| {
            self.list_version_components(key, prefix)
        })?;
        Ok(self.existing_keys(key, versions))
    }

    /// Version directories without a document are not versions
    fn existing_keys(&self, key: &Key, versions: Vec<Version>) -> Vec<Key> {
        versions
            .into_iter()
            .map(|v| key.with_version(v))
            .filter(|k| self.schema_path(k).is_file())
            .collect()
    }

    /// Every schema key under `scope`, sorted
    pub fn find_keys(&self, scope: &SearchScope) -> Result<Vec<Key>> {
        let dir = scope.dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let walker = WalkDir::new(&dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(SCHEMA_SUFFIX) {
                continue;
            }

            match Key::from_filename(&name) {
                Ok(key) if entry.path() == self.schema_path(&key) => keys.push(key),
                Ok(key) => warn!(
                    %key,
                    path = %entry.path().display(),
                    "skipping schema file outside its key's location"
                ),
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "skipping unparseable schema file name"
                ),
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Render `schema` for the named environment
    pub fn coordinate_render(&self, schema: &Rc<Schema>, env: &str) -> Result<Rc<RenderInfo>> {
        let env = self.config.env(env)?;
        if let Some(info) = schema.cached_render(&env.name) {
            return Ok(info);
        }
        Renderer::new(self, env).run(schema)
    }

    /// Render `schema` and compile it into a validator
    pub fn compile(&self, schema: &Rc<Schema>, env: &str) -> Result<Box<dyn CompiledSchema>> {
        let info = self.coordinate_render(schema, env)?;
        let compiled = self.compiler().compile(&info.env, &info.id).map_err(|e| match e {
            SchemaError::Compile { reason, .. } => SchemaError::Compile {
                key: schema.key().to_string(),
                reason,
            },
            other => other,
        })?;
        debug!(key = %schema.key(), env, "compiled schema");
        Ok(compiled)
    }

    /// Drop every cached schema, rendered document and compiled state
    pub fn reset(&self) {
        self.schemas.borrow_mut().clear();
        self.compiler.borrow_mut().clear();
        debug!("registry caches reset");
    }
}

/// Recursively copy `from` into a new directory `to`
fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(SchemaError::io(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(SchemaError::io(entry.path()))?;
        }
    }
    Ok(())
}
