//! Schema versioning utilities
//!
//! Version numbers are derived from the filesystem, not from the schema being
//! bumped: a minor release of `1.2.3` picks one past the highest minor that
//! already exists under major `1`, even if that is not `3`.
//!
//! Everything here works against a listing callback so it can be tested
//! without touching disk. The callback receives the version components fixed
//! so far and returns the numeric values found one level below:
//!
//! - `[]` lists majors of the family
//! - `[major]` lists minors under that major
//! - `[major, minor]` lists patches under that minor

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Kind of version bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseType::Major => "major",
            ReleaseType::Minor => "minor",
            ReleaseType::Patch => "patch",
        };
        f.write_str(name)
    }
}

impl FromStr for ReleaseType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(ReleaseType::Major),
            "minor" => Ok(ReleaseType::Minor),
            "patch" => Ok(ReleaseType::Patch),
            _ => Err(SchemaError::InvalidReleaseType(s.to_string())),
        }
    }
}

/// Compute the next version of a family for the given release type
pub fn bump_version<F>(current: &Version, release: ReleaseType, mut list: F) -> Result<Version>
where
    F: FnMut(&[u64]) -> Result<Vec<u64>>,
{
    let next = |values: Vec<u64>| values.into_iter().max().map_or(0, |max| max + 1);

    let version = match release {
        ReleaseType::Major => Version::new(next(list(&[])?), 0, 0),
        ReleaseType::Minor => Version::new(current.major, next(list(&[current.major])?), 0),
        ReleaseType::Patch => Version::new(
            current.major,
            current.minor,
            next(list(&[current.major, current.minor])?),
        ),
    };
    Ok(version)
}

/// All versions in the same major line as `current`, in ascending order
fn same_major<F>(current: &Version, list: &mut F) -> Result<Vec<Version>>
where
    F: FnMut(&[u64]) -> Result<Vec<u64>>,
{
    let mut versions = Vec::new();
    for minor in list(&[current.major])? {
        for patch in list(&[current.major, minor])? {
            versions.push(Version::new(current.major, minor, patch));
        }
    }
    versions.sort();
    versions.dedup();
    Ok(versions)
}

/// Versions below `current` within its major line, ascending
pub fn earlier_siblings<F>(current: &Version, mut list: F) -> Result<Vec<Version>>
where
    F: FnMut(&[u64]) -> Result<Vec<u64>>,
{
    let mut versions = same_major(current, &mut list)?;
    versions.retain(|v| (v.minor, v.patch) < (current.minor, current.patch));
    Ok(versions)
}

/// Versions above `current` within its major line, ascending
pub fn future_siblings<F>(current: &Version, mut list: F) -> Result<Vec<Version>>
where
    F: FnMut(&[u64]) -> Result<Vec<u64>>,
{
    let mut versions = same_major(current, &mut list)?;
    versions.retain(|v| (v.minor, v.patch) > (current.minor, current.patch));
    Ok(versions)
}
