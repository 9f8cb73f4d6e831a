//! Configuration types for artifact caches

use crate::result::CacheReadMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which backend to build
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Local directory cache
    #[default]
    Dir,
    /// No caching
    None,
}

/// Top-level artifact cache configuration
///
/// ```toml
/// mode = "dir"
/// dir = "/var/cache/build"
/// read_mode = "readwrite"
///
/// [two_level]
/// enabled = true
/// minimum_size = 1024
/// maximum_size = 104857600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactCacheConfig {
    /// Backend to use
    #[serde(default)]
    pub mode: CacheMode,

    /// Root of the directory cache
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Whether the backend accepts stores
    #[serde(default)]
    pub read_mode: CacheReadMode,

    /// Two-level (content-addressed) storage settings
    #[serde(default)]
    pub two_level: TwoLevelCacheConfig,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            dir: default_cache_dir(),
            read_mode: CacheReadMode::default(),
            two_level: TwoLevelCacheConfig::default(),
        }
    }
}

impl ArtifactCacheConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the document does not parse or the
    /// two-level bounds are inconsistent.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::configuration(format!("Invalid cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&contents)
    }

    /// Check the configuration for inconsistencies
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.mode == CacheMode::Dir && self.dir.as_os_str().is_empty() {
            return Err(Error::configuration("dir cache requires a non-empty `dir`"));
        }
        self.two_level.validate()
    }
}

/// Settings for the two-level cache decorator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwoLevelCacheConfig {
    /// Whether stores use the two-level layout at all
    #[serde(default)]
    pub enabled: bool,

    /// Smallest artifact (bytes, inclusive) stored as two levels
    #[serde(default = "default_minimum_size")]
    pub minimum_size: u64,

    /// Largest artifact (bytes, inclusive) stored as two levels; unbounded if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_size: Option<u64>,
}

impl Default for TwoLevelCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minimum_size: default_minimum_size(),
            maximum_size: None,
        }
    }
}

impl TwoLevelCacheConfig {
    /// Enabled with the given bounds
    #[must_use]
    pub fn enabled(minimum_size: u64, maximum_size: Option<u64>) -> Self {
        Self {
            enabled: true,
            minimum_size,
            maximum_size,
        }
    }

    /// Whether an artifact of `size` bytes goes through the two-level layout
    #[must_use]
    pub fn is_eligible(&self, size: u64) -> bool {
        self.enabled
            && size >= self.minimum_size
            && self.maximum_size.is_none_or(|max| size <= max)
    }

    /// Check the bounds
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `maximum_size < minimum_size`.
    pub fn validate(&self) -> Result<()> {
        match self.maximum_size {
            Some(max) if max < self.minimum_size => Err(Error::configuration(format!(
                "two_level.maximum_size ({max}) is smaller than two_level.minimum_size ({})",
                self.minimum_size
            ))),
            _ => Ok(()),
        }
    }
}

fn default_minimum_size() -> u64 {
    20 * 1024
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("buildcache")
        .join("artifacts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArtifactCacheConfig::default();
        assert_eq!(config.mode, CacheMode::Dir);
        assert_eq!(config.read_mode, CacheReadMode::ReadWrite);
        assert!(!config.two_level.enabled);
        assert_eq!(config.two_level.minimum_size, 20 * 1024);
        assert!(config.two_level.maximum_size.is_none());
        assert!(config.dir.ends_with("buildcache/artifacts"));
    }

    #[test]
    fn test_from_toml() {
        let config = ArtifactCacheConfig::from_toml_str(
            r#"
mode = "dir"
dir = "/var/cache/build"
read_mode = "readonly"

[two_level]
enabled = true
minimum_size = 1000
maximum_size = 5000
"#,
        )
        .unwrap();

        assert_eq!(config.dir, PathBuf::from("/var/cache/build"));
        assert_eq!(config.read_mode, CacheReadMode::ReadOnly);
        assert_eq!(
            config.two_level,
            TwoLevelCacheConfig::enabled(1000, Some(5000))
        );
    }

    #[test]
    fn test_from_toml_empty_uses_defaults() {
        let config = ArtifactCacheConfig::from_toml_str("").unwrap();
        assert_eq!(config, ArtifactCacheConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_inverted_bounds() {
        let err = ArtifactCacheConfig::from_toml_str(
            "[two_level]\nenabled = true\nminimum_size = 10\nmaximum_size = 5\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_from_toml_rejects_unknown_mode() {
        assert!(ArtifactCacheConfig::from_toml_str("mode = \"http\"").is_err());
    }

    #[test]
    fn test_eligibility_bounds_are_inclusive() {
        let config = TwoLevelCacheConfig::enabled(1000, Some(2000));
        assert!(!config.is_eligible(999));
        assert!(config.is_eligible(1000));
        assert!(config.is_eligible(2000));
        assert!(!config.is_eligible(2001));
    }

    #[test]
    fn test_eligibility_unbounded_maximum() {
        let config = TwoLevelCacheConfig::enabled(1000, None);
        assert!(config.is_eligible(u64::MAX));
    }

    #[test]
    fn test_eligibility_disabled() {
        let config = TwoLevelCacheConfig {
            enabled: false,
            minimum_size: 0,
            maximum_size: None,
        };
        assert!(!config.is_eligible(100));
    }
}
