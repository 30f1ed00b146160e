//! Versioned content checksums.
//!
//! A [`Checksum`] pairs a digest with the version of the algorithm that
//! produced it. Digests of different versions are never compared with each
//! other; a checksum whose version is older than [`ChecksumVersions::latest`]
//! is *stale* and gets regenerated from the changeset content.
//!
//! Checksums render as `"{version}:{digest}"`:
//!
//! ```rust
//! use shiftlog_migrate::checksum::{Checksum, ChecksumVersion};
//!
//! let checksum = Checksum::compute(ChecksumVersion::V2, "CREATE TABLE users (id INT)").unwrap();
//! let parsed: Checksum = checksum.to_string().parse().unwrap();
//! assert_eq!(parsed, checksum);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MigrateResult, MigrationError};

/// Version of the checksum algorithm.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChecksumVersion(u32);

impl ChecksumVersion {
    /// SHA-256 over the raw statement text.
    pub const V1: Self = Self(1);
    /// SHA-256 over whitespace-normalized statement text.
    pub const V2: Self = Self(2);
    /// Newest algorithm this crate knows how to compute.
    pub const LATEST: Self = Self::V2;

    /// Create a version from its number.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// The version number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this crate can compute checksums of this version.
    pub fn is_supported(self) -> bool {
        (Self::V1..=Self::LATEST).contains(&self)
    }
}

impl fmt::Display for ChecksumVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A versioned content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    version: ChecksumVersion,
    digest: String,
}

impl Checksum {
    /// Build a checksum from an already computed digest.
    pub fn new(version: ChecksumVersion, digest: impl Into<String>) -> Self {
        Self {
            version,
            digest: digest.into(),
        }
    }

    /// Compute the checksum of `content` with the algorithm of `version`.
    pub fn compute(version: ChecksumVersion, content: &str) -> MigrateResult<Self> {
        let digest = match version {
            ChecksumVersion::V1 => sha256_hex(content),
            ChecksumVersion::V2 => sha256_hex(&normalize_whitespace(content)),
            other => return Err(MigrationError::UnsupportedChecksumVersion(other.get())),
        };
        Ok(Self::new(version, digest))
    }

    /// Algorithm version.
    pub fn version(&self) -> ChecksumVersion {
        self.version
    }

    /// Hex digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.digest)
    }
}

impl FromStr for Checksum {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, digest) = s
            .split_once(':')
            .ok_or_else(|| MigrationError::InvalidChecksum(s.to_string()))?;
        let version: u32 = version
            .parse()
            .map_err(|_| MigrationError::InvalidChecksum(s.to_string()))?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MigrationError::InvalidChecksum(s.to_string()));
        }
        Ok(Self::new(ChecksumVersion(version), digest))
    }
}

impl TryFrom<String> for Checksum {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_string()
    }
}

/// Resolves which checksum version is current.
///
/// Passed to the visitor explicitly so tests can pin a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumVersions {
    latest: ChecksumVersion,
}

impl Default for ChecksumVersions {
    fn default() -> Self {
        Self {
            latest: ChecksumVersion::LATEST,
        }
    }
}

impl ChecksumVersions {
    /// Use the newest supported algorithm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the current version.
    pub fn pinned(version: ChecksumVersion) -> MigrateResult<Self> {
        if !version.is_supported() {
            return Err(MigrationError::UnsupportedChecksumVersion(version.get()));
        }
        Ok(Self { latest: version })
    }

    /// The current checksum version.
    pub fn latest(&self) -> ChecksumVersion {
        self.latest
    }

    /// Whether `checksum` was produced by an older algorithm.
    pub fn is_stale(&self, checksum: &Checksum) -> bool {
        checksum.version() < self.latest
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Collapse every whitespace run (including line endings) to a single space.
fn normalize_whitespace(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(ChecksumVersion::V1 < ChecksumVersion::V2);
        assert_eq!(ChecksumVersion::LATEST, ChecksumVersion::V2);
        assert!(!ChecksumVersion::new(0).is_supported());
        assert!(!ChecksumVersion::new(3).is_supported());
    }

    #[test]
    fn test_v2_ignores_whitespace_layout() {
        let a = Checksum::compute(ChecksumVersion::V2, "CREATE TABLE t (\n  id INT\n)").unwrap();
        let b = Checksum::compute(ChecksumVersion::V2, "CREATE TABLE t ( id INT )").unwrap();
        assert_eq!(a, b);

        let c = Checksum::compute(ChecksumVersion::V1, "CREATE TABLE t (\n  id INT\n)").unwrap();
        let d = Checksum::compute(ChecksumVersion::V1, "CREATE TABLE t ( id INT )").unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn test_unsupported_version() {
        let err = Checksum::compute(ChecksumVersion::new(9), "SELECT 1").unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedChecksumVersion(9)));
    }

    #[test]
    fn test_parse_and_display() {
        let checksum: Checksum = "1:abc123".parse().unwrap();
        assert_eq!(checksum.version(), ChecksumVersion::V1);
        assert_eq!(checksum.digest(), "abc123");
        assert_eq!(checksum.to_string(), "1:abc123");

        assert!("abc123".parse::<Checksum>().is_err());
        assert!("x:abc123".parse::<Checksum>().is_err());
        assert!("1:".parse::<Checksum>().is_err());
        assert!("1:not-hex".parse::<Checksum>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let checksum = Checksum::new(ChecksumVersion::V2, "ff00");
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json, "\"2:ff00\"");
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checksum);
    }

    #[test]
    fn test_versions_staleness() {
        let versions = ChecksumVersions::default();
        assert!(versions.is_stale(&Checksum::new(ChecksumVersion::V1, "aa")));
        assert!(!versions.is_stale(&Checksum::new(ChecksumVersion::V2, "aa")));

        let pinned = ChecksumVersions::pinned(ChecksumVersion::V1).unwrap();
        assert!(!pinned.is_stale(&Checksum::new(ChecksumVersion::V1, "aa")));
        assert!(ChecksumVersions::pinned(ChecksumVersion::new(7)).is_err());
    }
}
