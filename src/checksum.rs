//! Checksums for distribution artifacts

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Name of the checksum listing written next to distributed schemas
pub const CHECKSUMS_FILENAME: &str = "checksums.sha256";

/// SHA256 checksum of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        *self == Self::from_bytes(data)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `sha256sum`-compatible listing, one `<hex>  <name>` line per artifact,
/// sorted by name
pub fn checksum_listing<'a, I>(artifacts: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Checksum)>,
{
    let mut artifacts: Vec<_> = artifacts.into_iter().collect();
    artifacts.sort_by_key(|(name, _)| *name);
    artifacts
        .into_iter()
        .map(|(name, checksum)| format!("{}  {}\n", checksum, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = br#"{"name": "test", "version": "1.0.0"}"#;
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
        assert_eq!(Checksum::from_bytes(content).as_str().len(), 64);
    }

    #[test]
    fn test_checksum_different_content() {
        assert_ne!(
            Checksum::from_bytes(br#"{"name": "test1"}"#),
            Checksum::from_bytes(br#"{"name": "test2"}"#)
        );
    }

    #[test]
    fn test_checksum_verification() {
        let content = br#"{"name": "test"}"#;
        let checksum = Checksum::from_bytes(content);
        assert!(checksum.verify(content));
        assert!(!checksum.verify(b"different content"));
    }

    #[test]
    fn test_listing_is_sorted_by_name() {
        let b = Checksum::from_bytes(b"b");
        let a = Checksum::from_bytes(b"a");
        let listing = checksum_listing([("b.schema.json", &b), ("a.schema.json", &a)]);
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("{}  a.schema.json", a));
        assert!(lines[1].ends_with("  b.schema.json"));
    }
}
