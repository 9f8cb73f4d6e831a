//! Rule keys and the description of a store request

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Fingerprint of a build rule, rendered as a lowercase hex digest
///
/// Any even-length, non-empty hex string is accepted; input is normalized to
/// lowercase so that keys compare by value regardless of how they were typed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleKey(String);

impl RuleKey {
    /// Parse a rule key from its hex rendering
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRuleKey`] if the string is empty, has an odd
    /// length or contains non-hex characters.
    pub fn new(hex: impl Into<String>) -> Result<Self> {
        let value = hex.into();
        if value.is_empty() {
            return Err(Error::invalid_rule_key(value, "rule key must not be empty"));
        }
        if value.len() % 2 != 0 {
            return Err(Error::invalid_rule_key(
                value,
                "rule key must have an even number of hex digits",
            ));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_rule_key(
                value,
                "rule key must contain only hex digits",
            ));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// The hex rendering
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RuleKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for RuleKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.0
    }
}

/// One store request: the keys to store under and the metadata to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    rule_keys: BTreeSet<RuleKey>,
    metadata: BTreeMap<String, String>,
}

impl ArtifactInfo {
    /// Start building an artifact description
    #[must_use]
    pub fn builder() -> ArtifactInfoBuilder {
        ArtifactInfoBuilder::default()
    }

    /// Keys the artifact is stored under (never empty)
    #[must_use]
    pub fn rule_keys(&self) -> &BTreeSet<RuleKey> {
        &self.rule_keys
    }

    /// Caller-defined metadata
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Builder for [`ArtifactInfo`]
#[derive(Debug, Default, Clone)]
pub struct ArtifactInfoBuilder {
    rule_keys: BTreeSet<RuleKey>,
    metadata: BTreeMap<String, String>,
}

impl ArtifactInfoBuilder {
    /// Add one rule key
    #[must_use]
    pub fn rule_key(mut self, key: RuleKey) -> Self {
        self.rule_keys.insert(key);
        self
    }

    /// Add several rule keys
    #[must_use]
    pub fn rule_keys(mut self, keys: impl IntoIterator<Item = RuleKey>) -> Self {
        self.rule_keys.extend(keys);
        self
    }

    /// Add one metadata entry, replacing any previous value for `key`
    #[must_use]
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merge a metadata map into the builder
    #[must_use]
    pub fn metadata(mut self, metadata: impl IntoIterator<Item = (String, String)>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Finish building
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArtifactInfo`] if no rule key was added.
    pub fn build(self) -> Result<ArtifactInfo> {
        if self.rule_keys.is_empty() {
            return Err(Error::invalid_artifact_info(
                "an artifact must be stored under at least one rule key",
            ));
        }
        Ok(ArtifactInfo {
            rule_keys: self.rule_keys,
            metadata: self.metadata,
        })
    }
}

/// Path to an artifact on disk, plus whether a backend may take it over
///
/// A borrowable path may be moved into the cache instead of copied. Paths
/// that are shared (such as a marker file used for many stores) must be
/// handed over as not borrowable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowablePath {
    path: PathBuf,
    borrowable: bool,
}

impl BorrowablePath {
    /// A path the backend may move
    #[must_use]
    pub fn borrowable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            borrowable: true,
        }
    }

    /// A path the backend must leave in place
    #[must_use]
    pub fn not_borrowable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            borrowable: false,
        }
    }

    /// The path itself
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backend may move the file
    #[must_use]
    pub fn is_borrowable(&self) -> bool {
        self.borrowable
    }
}
