//! Artifact cache abstraction
//!
//! Defines the `ArtifactCache` trait every backend implements, and the
//! `CacheDecorator` trait for caches that wrap another cache. A decorator is
//! itself an `ArtifactCache`, so decorators chain without special cases.

use crate::artifact::{ArtifactInfo, BorrowablePath, RuleKey};
use crate::result::{CacheReadMode, CacheResult};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// A store mapping rule keys to artifact payloads plus metadata
///
/// Implementations must be thread-safe (`Send + Sync`): the build engine
/// fetches and stores from many workers at once.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Look `rule_key` up and, on a hit, write the payload to `output`
    ///
    /// `output` is only overwritten on a hit. Backend failures are reported
    /// as [`CacheResult::Error`], never as a panic.
    async fn fetch(&self, rule_key: &RuleKey, output: &Path) -> CacheResult;

    /// Store the file at `output` under every key in `info`
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact could not be stored. Callers are
    /// expected to log and continue; a failed store never fails a build.
    async fn store(&self, info: &ArtifactInfo, output: &BorrowablePath) -> Result<()>;

    /// Whether this cache accepts stores
    fn cache_read_mode(&self) -> CacheReadMode;

    /// Release resources held by the cache
    ///
    /// Best effort and idempotent; never panics.
    fn close(&self);
}

/// A cache that wraps another cache
pub trait CacheDecorator: ArtifactCache {
    /// The wrapped cache
    fn delegate(&self) -> &Arc<dyn ArtifactCache>;
}

/// Cache that never stores and never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtifactCache;

impl NoopArtifactCache {
    /// Create a no-op cache
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactCache for NoopArtifactCache {
    async fn fetch(&self, _rule_key: &RuleKey, _output: &Path) -> CacheResult {
        CacheResult::ignored()
    }

    async fn store(&self, _info: &ArtifactInfo, _output: &BorrowablePath) -> Result<()> {
        Ok(())
    }

    fn cache_read_mode(&self) -> CacheReadMode {
        CacheReadMode::ReadOnly
    }

    fn close(&self) {}
}
