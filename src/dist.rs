//! Distribution builds
//!
//! Renders schemas for one environment into `<out>/<env>/<key>.schema.json`
//! and writes a `checksums.sha256` listing for everything written. Rendering
//! runs on the caller's thread; writing the artifacts is spread over a small
//! pool of scoped threads.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, info};

use crate::checksum::{checksum_listing, Checksum, CHECKSUMS_FILENAME};
use crate::error::{Result, SchemaError};
use crate::gitter::{Anchor, Gitter};
use crate::key::{Key, SearchScope, SCHEMA_SUFFIX};
use crate::registry::Registry;

const DEFAULT_WORKERS: usize = 4;

/// A rendered document waiting to be written
struct Artifact {
    filename: String,
    content: Vec<u8>,
}

/// Builds distribution directories from a registry
#[derive(Debug)]
pub struct DistBuilder<'r> {
    registry: &'r Registry,
    out_dir: PathBuf,
    num_workers: usize,
}

impl<'r> DistBuilder<'r> {
    pub fn new(registry: &'r Registry, out_dir: impl Into<PathBuf>) -> Self {
        let num_workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(DEFAULT_WORKERS);
        Self {
            registry,
            out_dir: out_dir.into(),
            num_workers,
        }
    }

    /// Number of writer threads, at least one
    pub fn set_num_workers(&mut self, num_workers: usize) -> &mut Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Directory artifacts for `env` are written to
    pub fn env_dir(&self, env: &str) -> PathBuf {
        self.out_dir.join(env)
    }

    /// Render and write every schema in the registry
    pub fn build_all(&self, env: &str) -> Result<usize> {
        let keys = self.registry.find_keys(&SearchScope::root())?;
        info!(env, schemas = keys.len(), "building full distribution");
        self.build(env, &keys)
    }

    /// Render and write the schemas changed since `anchor`
    ///
    /// Modifying an already deployed schema is refused unless the environment
    /// allows mutation. Deleted files are ignored.
    pub fn build_changed(&self, env: &str, anchor: &Anchor, gitter: &Gitter) -> Result<usize> {
        let env_config = self.registry.config().env(env)?;
        let changes = gitter.schema_changes(anchor, self.registry.root(), SCHEMA_SUFFIX)?;

        let mut keys = Vec::new();
        for change in changes {
            let key = Key::from_path(&change.path)?;
            if !change.is_new && !env_config.allow_schema_mutation {
                return Err(SchemaError::SchemaMutationNotAllowed {
                    key: key.to_string(),
                    env: env.to_string(),
                });
            }
            keys.push(key);
        }

        info!(env, anchor = %anchor.tag, schemas = keys.len(), "building changed schemas");
        self.build(env, &keys)
    }

    fn build(&self, env: &str, keys: &[Key]) -> Result<usize> {
        let mut artifacts = Vec::with_capacity(keys.len());
        for key in keys {
            let schema = self.registry.get_schema_by_key(key)?;
            let info = self.registry.coordinate_render(&schema, env)?;
            artifacts.push(Artifact {
                filename: key.filename(),
                content: info.content.clone(),
            });
        }

        let dir = self.env_dir(env);
        fs::create_dir_all(&dir).map_err(SchemaError::io(&dir))?;

        let written = write_artifacts(&dir, &artifacts, self.num_workers)?;
        let listing = checksum_listing(written.iter().map(|(name, sum)| (name.as_str(), sum)));
        let checksums = dir.join(CHECKSUMS_FILENAME);
        fs::write(&checksums, listing).map_err(SchemaError::io(&checksums))?;

        info!(env, dir = %dir.display(), written = written.len(), "distribution written");
        Ok(written.len())
    }
}

fn write_artifacts(
    dir: &Path,
    artifacts: &[Artifact],
    num_workers: usize,
) -> Result<Vec<(String, Checksum)>> {
    if artifacts.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = artifacts.len().div_ceil(num_workers);

    thread::scope(|scope| {
        let handles: Vec<_> = artifacts
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || write_chunk(dir, chunk)))
            .collect();

        let mut written = Vec::with_capacity(artifacts.len());
        for handle in handles {
            let chunk = handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
            written.extend(chunk);
        }
        Ok(written)
    })
}

fn write_chunk(dir: &Path, chunk: &[Artifact]) -> Result<Vec<(String, Checksum)>> {
    chunk
        .iter()
        .map(|artifact| {
            let path = dir.join(&artifact.filename);
            fs::write(&path, &artifact.content).map_err(SchemaError::io(&path))?;
            debug!(path = %path.display(), "wrote artifact");
            Ok((artifact.filename.clone(), Checksum::from_bytes(&artifact.content)))
        })
        .collect()
}
