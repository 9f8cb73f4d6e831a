//! Fetch outcomes and read modes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a cache fetch
///
/// Every backend outcome is data: a failing backend reports
/// [`CacheResult::Error`] instead of returning `Err`, so callers can always
/// treat anything other than a hit as "build it".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult {
    /// The artifact was found and written to the destination
    Hit {
        /// Which backend served the hit (e.g. `dir`, `http`)
        source: Option<String>,
        /// Metadata stored alongside the artifact
        metadata: BTreeMap<String, String>,
        /// Size of the fetched payload, when the backend knows it
        artifact_size_bytes: Option<u64>,
    },
    /// The key is not present
    Miss,
    /// The backend failed while looking the key up
    Error {
        /// Which backend failed
        source: String,
        /// Failure description
        message: String,
    },
    /// The backend declined to look (e.g. caching disabled)
    Ignored,
}

/// Discriminant of a [`CacheResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheResultType {
    /// See [`CacheResult::Hit`]
    Hit,
    /// See [`CacheResult::Miss`]
    Miss,
    /// See [`CacheResult::Error`]
    Error,
    /// See [`CacheResult::Ignored`]
    Ignored,
}

impl CacheResultType {
    /// Whether the artifact is now available at the destination
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for CacheResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Error => "error",
            Self::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

impl CacheResult {
    /// A hit served by `source`
    #[must_use]
    pub fn hit(
        source: impl Into<String>,
        metadata: BTreeMap<String, String>,
        artifact_size_bytes: u64,
    ) -> Self {
        Self::Hit {
            source: Some(source.into()),
            metadata,
            artifact_size_bytes: Some(artifact_size_bytes),
        }
    }

    /// A miss
    #[must_use]
    pub fn miss() -> Self {
        Self::Miss
    }

    /// A backend failure
    #[must_use]
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            source: source.into(),
            message: message.into(),
        }
    }

    /// The backend did not look
    #[must_use]
    pub fn ignored() -> Self {
        Self::Ignored
    }

    /// Discriminant of this result
    #[must_use]
    pub fn result_type(&self) -> CacheResultType {
        match self {
            Self::Hit { .. } => CacheResultType::Hit,
            Self::Miss => CacheResultType::Miss,
            Self::Error { .. } => CacheResultType::Error,
            Self::Ignored => CacheResultType::Ignored,
        }
    }

    /// Whether this is a hit
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_type().is_success()
    }

    /// Metadata of a hit; `None` for every other outcome
    #[must_use]
    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Hit { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    /// Backend that produced the result, if known
    #[must_use]
    pub fn cache_source(&self) -> Option<&str> {
        match self {
            Self::Hit { source, .. } => source.as_deref(),
            Self::Error { source, .. } => Some(source),
            Self::Miss | Self::Ignored => None,
        }
    }

    /// Payload size of a hit, if the backend reported it
    #[must_use]
    pub fn artifact_size_bytes(&self) -> Option<u64> {
        match self {
            Self::Hit {
                artifact_size_bytes,
                ..
            } => *artifact_size_bytes,
            _ => None,
        }
    }
}

/// Whether a cache accepts stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheReadMode {
    /// Fetches and stores
    #[default]
    ReadWrite,
    /// Fetches only; stores are dropped
    ReadOnly,
}

impl CacheReadMode {
    /// Whether stores are accepted
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_accessors() {
        let metadata = BTreeMap::from([("k".to_string(), "v".to_string())]);
        let result = CacheResult::hit("dir", metadata.clone(), 42);

        assert!(result.is_success());
        assert_eq!(result.result_type(), CacheResultType::Hit);
        assert_eq!(result.metadata(), Some(&metadata));
        assert_eq!(result.cache_source(), Some("dir"));
        assert_eq!(result.artifact_size_bytes(), Some(42));
    }

    #[test]
    fn test_non_hits_are_not_success() {
        for result in [
            CacheResult::miss(),
            CacheResult::error("http", "timeout"),
            CacheResult::ignored(),
        ] {
            assert!(!result.is_success());
            assert!(result.metadata().is_none());
            assert!(result.artifact_size_bytes().is_none());
        }
    }

    #[test]
    fn test_error_reports_source() {
        let result = CacheResult::error("http", "timeout");
        assert_eq!(result.cache_source(), Some("http"));
        assert_eq!(result.result_type().to_string(), "error");
    }

    #[test]
    fn test_read_mode_serde() {
        let mode: CacheReadMode = serde_json::from_str("\"readonly\"").unwrap();
        assert_eq!(mode, CacheReadMode::ReadOnly);
        assert!(!mode.is_writable());
        assert!(CacheReadMode::default().is_writable());
    }
}
