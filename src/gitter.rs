//! Change tracking against deployment anchors
//!
//! A deployment to an environment is marked with a lightweight git tag
//! `jsm-deploy/<env>/<YYYYMMDDHHMMSS>`. The most recent tag for an environment
//! is its anchor; schema files that differ from the anchor are what the next
//! deployment has to ship.

use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::{Delta, DiffOptions, Repository};
use tracing::{debug, info};

use crate::error::{Result, SchemaError};

/// Prefix of every deployment tag
pub const TAG_PREFIX: &str = "jsm-deploy";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// The tag of the last successful deployment to an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub tag: String,
}

/// A schema file that differs from an anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Absolute path in the working tree
    pub path: PathBuf,
    /// `true` when the file did not exist at the anchor
    pub is_new: bool,
}

/// Git access for the repository containing a registry
pub struct Gitter {
    repo: Repository,
    workdir: PathBuf,
}

impl std::fmt::Debug for Gitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gitter").field("workdir", &self.workdir).finish()
    }
}

impl Gitter {
    /// Find the repository containing `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path.as_ref())?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| git2::Error::from_str("repository has no working directory"))?;
        let workdir = std::fs::canonicalize(workdir).map_err(SchemaError::io(workdir))?;
        debug!(workdir = %workdir.display(), "opened git repository");
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Most recent deployment tag for `env`
    pub fn latest_anchor(&self, env: &str) -> Result<Anchor> {
        let prefix = format!("{}/{}/", TAG_PREFIX, env);
        let tags = self.repo.tag_names(Some(&format!("{}*", prefix)))?;

        // timestamps are fixed width, so the lexical maximum is the newest
        tags.iter()
            .flatten()
            .filter(|tag| {
                tag.strip_prefix(&prefix).is_some_and(|stamp| {
                    stamp.len() == 14 && stamp.bytes().all(|b| b.is_ascii_digit())
                })
            })
            .max()
            .map(|tag| Anchor { tag: tag.to_string() })
            .ok_or_else(|| SchemaError::NoDeploymentAnchor { env: env.to_string() })
    }

    /// Files under `source_dir` ending in `suffix` that changed since `anchor`
    ///
    /// Compares the anchor's tree with the working directory, index included,
    /// so uncommitted and untracked files count.
    pub fn schema_changes(
        &self,
        anchor: &Anchor,
        source_dir: &Path,
        suffix: &str,
    ) -> Result<Vec<Change>> {
        let tree = self
            .repo
            .revparse_single(&format!("refs/tags/{}", anchor.tag))?
            .peel_to_tree()?;

        let source_dir = std::fs::canonicalize(source_dir).map_err(SchemaError::io(source_dir))?;
        let relative = source_dir.strip_prefix(&self.workdir).map_err(|_| {
            SchemaError::LocationOutsideRootDirectory {
                path: source_dir.clone(),
                root: self.workdir.clone(),
            }
        })?;

        let mut options = DiffOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        if !relative.as_os_str().is_empty() {
            options.pathspec(relative);
        }

        let diff = self.repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut options))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let is_new = match delta.status() {
                Delta::Added | Delta::Untracked => true,
                Delta::Modified | Delta::Renamed | Delta::Copied | Delta::Typechange => false,
                _ => continue,
            };
            let Some(path) = delta.new_file().path() else {
                continue;
            };
            if !path.to_string_lossy().ends_with(suffix) {
                continue;
            }
            changes.push(Change {
                path: self.workdir.join(path),
                is_new,
            });
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(anchor = %anchor.tag, changes = changes.len(), "computed schema changes");
        Ok(changes)
    }

    /// Tag HEAD as a successful deployment to `env`
    pub fn tag_deployment_success(&self, env: &str) -> Result<String> {
        let tag = format!("{}/{}/{}", TAG_PREFIX, env, Utc::now().format(TIMESTAMP_FORMAT));
        let head = self.repo.revparse_single("HEAD")?;
        self.repo.tag_lightweight(&tag, &head, false)?;
        info!(%tag, "tagged deployment");
        Ok(tag)
    }
}
