//! Schema keys and search scopes
//!
//! A key encodes the whole identity of one schema version:
//!
//! ```text
//! org_team_project-a_a-family_1_2_3
//! └──── domain ────┘ └family┘ └ver┘
//! ```
//!
//! and maps one-to-one onto its location in the registry:
//!
//! ```text
//! org/team/project-a/a-family/1/2/3/org_team_project-a_a-family_1_2_3.schema.json
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::Version;
use serde::{Serialize, Serializer};

use crate::error::{Result, SchemaError};

/// File suffix shared by every schema document
pub const SCHEMA_SUFFIX: &str = ".schema.json";

/// Separator between key segments
pub const KEY_SEPARATOR: char = '_';

/// Letters, digits and hyphen; non-empty
pub(crate) fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Structured identifier of a single schema version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    domain: Vec<String>,
    family: String,
    version: Version,
}

impl Key {
    /// Parse a key such as `org_team_family_1_0_0`
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty()
            || !input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == KEY_SEPARATOR)
        {
            return Err(SchemaError::InvalidSchemaKeyCharacters {
                key: input.to_string(),
            });
        }

        let mut tokens: Vec<&str> = input.split(KEY_SEPARATOR).collect();

        let patch = tokens.pop().unwrap_or_default();
        let minor = tokens.pop().unwrap_or_default();
        let major = tokens.pop().unwrap_or_default();

        let major = version_number(major).ok_or_else(|| SchemaError::InvalidMajorVersion {
            key: input.to_string(),
            value: major.to_string(),
        })?;
        let minor = version_number(minor).ok_or_else(|| SchemaError::InvalidMinorVersion {
            key: input.to_string(),
            value: minor.to_string(),
        })?;
        let patch = version_number(patch).ok_or_else(|| SchemaError::InvalidPatchVersion {
            key: input.to_string(),
            value: patch.to_string(),
        })?;

        let family = match tokens.pop() {
            Some(family) => family,
            None => {
                return Err(SchemaError::InvalidFamilyName {
                    name: String::new(),
                })
            }
        };
        if tokens.is_empty() {
            return Err(SchemaError::NoDomain {
                key: input.to_string(),
            });
        }

        Self::new(tokens, family, Version::new(major, minor, patch))
    }

    /// Build a key from its parts, validating every segment
    pub fn new<S: AsRef<str>>(
        domain: impl IntoIterator<Item = S>,
        family: &str,
        version: Version,
    ) -> Result<Self> {
        let domain: Vec<String> = domain.into_iter().map(|s| s.as_ref().to_string()).collect();
        if domain.is_empty() {
            return Err(SchemaError::NoDomain {
                key: family.to_string(),
            });
        }
        if let Some(bad) = domain.iter().find(|d| !is_valid_segment(d)) {
            return Err(SchemaError::InvalidDomain { domain: bad.clone() });
        }
        if !is_valid_segment(family) {
            return Err(SchemaError::InvalidFamilyName {
                name: family.to_string(),
            });
        }

        Ok(Self {
            domain,
            family: family.to_string(),
            version: Version::new(version.major, version.minor, version.patch),
        })
    }

    /// First version of a new family from a `domain[/domain...]/family` string
    pub fn initial(domain_and_family: &str) -> Result<Self> {
        let trimmed = domain_and_family.trim_matches('/');
        let mut parts: Vec<&str> = trimmed.split('/').collect();
        let family = parts.pop().unwrap_or_default();
        if parts.is_empty() {
            return Err(SchemaError::NoDomain {
                key: domain_and_family.to_string(),
            });
        }
        Self::new(parts, family, Version::new(1, 0, 0))
    }

    /// Parse the key out of a `<key>.schema.json` file name
    pub fn from_filename(filename: &str) -> Result<Self> {
        let stem = filename
            .strip_suffix(SCHEMA_SUFFIX)
            .ok_or_else(|| SchemaError::NotASchemaFile {
                path: filename.to_string(),
            })?;
        Self::parse(stem)
    }

    /// Parse the key out of a schema file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SchemaError::NotASchemaFile {
                path: path.display().to_string(),
            })?;
        Self::from_filename(name)
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Same domain and family, different version
    pub fn with_version(&self, version: Version) -> Self {
        Self {
            domain: self.domain.clone(),
            family: self.family.clone(),
            version: Version::new(version.major, version.minor, version.patch),
        }
    }

    /// `<key>.schema.json`
    pub fn filename(&self) -> String {
        format!("{}{}", self, SCHEMA_SUFFIX)
    }

    /// `domain/.../family`, relative to the registry root
    pub fn family_dir(&self) -> PathBuf {
        let mut path: PathBuf = self.domain.iter().collect();
        path.push(&self.family);
        path
    }

    /// `domain/.../family/major/minor/patch`, relative to the registry root
    pub fn version_dir(&self) -> PathBuf {
        self.family_dir()
            .join(self.version.major.to_string())
            .join(self.version.minor.to_string())
            .join(self.version.patch.to_string())
    }

    /// Location of the schema document relative to the registry root
    pub fn relative_path(&self) -> PathBuf {
        self.version_dir().join(self.filename())
    }
}

/// Decimal without leading zeros, so the number maps back to the same directory
fn version_number(value: &str) -> Option<u64> {
    let canonical = !value.is_empty()
        && value.bytes().all(|b| b.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'));
    if !canonical {
        return None;
    }
    value.parse().ok()
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.domain {
            write!(f, "{}{}", segment, KEY_SEPARATOR)?;
        }
        write!(
            f,
            "{}_{}_{}_{}",
            self.family, self.version.major, self.version.minor, self.version.patch
        )
    }
}

impl FromStr for Key {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A `/`-separated subtree of the domain/family/version hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SearchScope(String);

impl SearchScope {
    /// Validate a scope string; the empty string is the whole registry
    pub fn new(scope: &str) -> Result<Self> {
        let trimmed = scope.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if !trimmed.split('/').all(is_valid_segment) {
            return Err(SchemaError::InvalidSearchScope {
                scope: scope.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The whole registry
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Build a scope from a path relative to the registry root
    pub fn from_relative_path(path: &Path) -> Result<Self> {
        let parts: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Self::new(&parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Directory this scope selects under `root`
    pub fn dir(&self, root: &Path) -> PathBuf {
        self.0.split('/').filter(|s| !s.is_empty()).fold(root.to_path_buf(), |p, s| p.join(s))
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
