//! Two-level (content-addressed) artifact cache decorator
//!
//! Plain backends map `rule key -> (metadata, artifact)`, so any change to the
//! key or metadata re-transfers the artifact even when its bytes are
//! unchanged. This decorator splits each eligible entry in two:
//!
//! ```text
//! rule key     -> (metadata + TWO_LEVEL_CACHE_CONTENT_HASH, empty marker)
//! content key  -> artifact
//! ```
//!
//! The artifact is only transferred when its content changes. The cost is a
//! second round trip when fetching content that has not been seen before.
//!
//! Entries without the reserved metadata key are served as-is, so one-level
//! and two-level entries can live side by side in the same backend.

use crate::artifact::{ArtifactInfo, BorrowablePath, RuleKey};
use crate::backend::{ArtifactCache, CacheDecorator};
use crate::config::TwoLevelCacheConfig;
use crate::filesystem::ProjectFilesystem;
use crate::result::{CacheReadMode, CacheResult};
use crate::{Error, Result};
use async_trait::async_trait;
use buildcache_counters::{
    CounterRegistry, IntegerCounter, SamplingCounter, TagSetCounter,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Reserved metadata key marking a first-level entry as a pointer
///
/// Its value is the content key holding the real artifact. Nothing else may
/// write this key.
pub const METADATA_KEY: &str = "TWO_LEVEL_CACHE_CONTENT_HASH";

/// Counter category for everything this decorator records
pub const COUNTER_CATEGORY: &str = "two_level_cache_stats";

/// Appended to the content hash to form the content key
const CONTENT_KEY_SUFFIX: &str = "2c00";

/// Source tag on errors produced by the decorator itself
const SOURCE: &str = "two_level";

const MARKER_PREFIX: &str = ".buildcache";
const MARKER_SUFFIX: &str = ".empty";

/// Build the content key for a lowercase hex content hash
///
/// # Errors
///
/// Returns [`Error::InvalidRuleKey`] if `content_hash` is not valid hex.
pub fn content_key(content_hash: &str) -> Result<RuleKey> {
    RuleKey::new(format!("{content_hash}{CONTENT_KEY_SUFFIX}"))
}

/// Counters recorded by [`TwoLevelArtifactCacheDecorator`]
#[derive(Debug, Clone)]
pub struct TwoLevelCounters {
    hit_types: Arc<TagSetCounter>,
    hit_bytes: Arc<SamplingCounter>,
    misses: Arc<IntegerCounter>,
    hash_time_ms: Arc<SamplingCounter>,
}

impl TwoLevelCounters {
    fn new() -> Self {
        Self {
            hit_types: Arc::new(TagSetCounter::new(
                COUNTER_CATEGORY,
                "second_level_cache_hit_types",
                BTreeMap::new(),
            )),
            hit_bytes: Arc::new(SamplingCounter::new(
                COUNTER_CATEGORY,
                "second_level_cache_hit_bytes",
                BTreeMap::new(),
            )),
            misses: Arc::new(IntegerCounter::new(
                COUNTER_CATEGORY,
                "second_level_cache_misses",
                BTreeMap::new(),
            )),
            hash_time_ms: Arc::new(SamplingCounter::new(
                COUNTER_CATEGORY,
                "second_level_hash_computation_time_ms",
                BTreeMap::new(),
            )),
        }
    }

    fn register(&self, registry: &dyn CounterRegistry) {
        registry.register_counters(vec![
            Arc::clone(&self.hit_types).into(),
            Arc::clone(&self.hit_bytes).into(),
            Arc::clone(&self.misses).into(),
            Arc::clone(&self.hash_time_ms).into(),
        ]);
    }

    /// Second-level hits by backend source
    #[must_use]
    pub fn hit_types(&self) -> &TagSetCounter {
        &self.hit_types
    }

    /// Sizes of second-level hits
    #[must_use]
    pub fn hit_bytes(&self) -> &SamplingCounter {
        &self.hit_bytes
    }

    /// Pointer entries whose content could not be fetched
    #[must_use]
    pub fn misses(&self) -> &IntegerCounter {
        &self.misses
    }

    /// Time spent hashing artifacts, in milliseconds
    #[must_use]
    pub fn hash_time_ms(&self) -> &SamplingCounter {
        &self.hash_time_ms
    }
}

/// Decorator storing eligible artifacts as a pointer plus a content entry
pub struct TwoLevelArtifactCacheDecorator {
    delegate: Arc<dyn ArtifactCache>,
    filesystem: Arc<dyn ProjectFilesystem>,
    /// Zero-length payload of every pointer entry; never written after creation
    empty_file: PathBuf,
    config: TwoLevelCacheConfig,
    counters: TwoLevelCounters,
}

impl TwoLevelArtifactCacheDecorator {
    /// Wrap `delegate`
    ///
    /// Creates the shared marker file under the filesystem's scratch
    /// directory and registers the decorator's counters with `registry`.
    ///
    /// Bounds with `maximum_size < minimum_size` are rejected here instead of
    /// making every artifact ineligible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScratchFile`] if the scratch directory or the marker
    /// file cannot be created, and [`Error::Configuration`] if
    /// `maximum_size < minimum_size`. The bounds are checked first, so a
    /// rejected config never leaves a marker file behind.
    pub fn new(
        delegate: Arc<dyn ArtifactCache>,
        filesystem: Arc<dyn ProjectFilesystem>,
        registry: &dyn CounterRegistry,
        config: TwoLevelCacheConfig,
    ) -> Result<Self> {
        config.validate()?;

        let tmp_dir = filesystem.tmp_dir();
        let empty_file = filesystem
            .mkdirs(&tmp_dir)
            .and_then(|()| filesystem.create_temp_file(&tmp_dir, MARKER_PREFIX, MARKER_SUFFIX))
            .map_err(|e| Error::scratch_file(&tmp_dir, e))?;

        let counters = TwoLevelCounters::new();
        counters.register(registry);

        debug!(
            marker = %empty_file.display(),
            enabled = config.enabled,
            minimum_size = config.minimum_size,
            maximum_size = ?config.maximum_size,
            "Created two-level artifact cache"
        );

        Ok(Self {
            delegate,
            filesystem,
            empty_file,
            config,
            counters,
        })
    }

    /// Counters recorded by this decorator
    #[must_use]
    pub fn counters(&self) -> &TwoLevelCounters {
        &self.counters
    }

    /// The shared zero-length marker file
    #[must_use]
    pub fn marker_path(&self) -> &Path {
        &self.empty_file
    }

    /// Store `info` as a pointer plus content entry when eligible
    ///
    /// Returns `Ok(false)` when the artifact is not eligible and nothing was
    /// stored. Once the attempt starts, any failure is returned as-is.
    async fn attempt_two_level_store(
        &self,
        info: &ArtifactInfo,
        output: &BorrowablePath,
    ) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let size = self.filesystem.file_size(output.path())?;
        if !self.config.is_eligible(size) {
            trace!(size, "Artifact size outside two-level bounds");
            return Ok(false);
        }

        let content_key = self.compute_content_key(output.path()).await?;

        let pointer_info = ArtifactInfo::builder()
            .rule_keys(info.rule_keys().iter().cloned())
            .metadata(info.metadata().clone())
            .metadata_entry(METADATA_KEY, content_key.as_str())
            .build()?;
        let content_info = ArtifactInfo::builder().rule_key(content_key).build()?;
        let marker = BorrowablePath::not_borrowable(&self.empty_file);

        // Both stores run to completion before either outcome is looked at.
        let (pointer, content) = futures::join!(
            self.delegate.store(&pointer_info, &marker),
            self.delegate.store(&content_info, output),
        );
        pointer?;
        content?;

        Ok(true)
    }

    async fn compute_content_key(&self, path: &Path) -> Result<RuleKey> {
        let filesystem = Arc::clone(&self.filesystem);
        let owned_path = path.to_path_buf();

        let start = Instant::now();
        let hash = tokio::task::spawn_blocking(move || filesystem.compute_sha256(&owned_path)).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.counters.hash_time_ms.add_sample(elapsed_ms);

        let hash = hash.map_err(|e| Error::task_join("content hash", &e))??;
        content_key(&hash)
    }
}

#[async_trait]
impl ArtifactCache for TwoLevelArtifactCacheDecorator {
    async fn fetch(&self, rule_key: &RuleKey, output: &Path) -> CacheResult {
        let fetch_result = self.delegate.fetch(rule_key, output).await;
        let Some(metadata) = fetch_result.metadata() else {
            trace!(
                rule_key = %rule_key,
                result = %fetch_result.result_type(),
                "Missed first-level lookup"
            );
            return fetch_result;
        };
        let Some(content_hash) = metadata.get(METADATA_KEY) else {
            trace!(rule_key = %rule_key, "Found a single-level entry");
            return fetch_result;
        };
        trace!(rule_key = %rule_key, metadata = ?metadata, "Found a first-level artifact");

        let content_key = match RuleKey::new(content_hash.as_str()) {
            Ok(key) => key,
            Err(e) => {
                trace!(rule_key = %rule_key, error = %e, "First-level entry points at an invalid key");
                self.counters.misses.inc();
                return CacheResult::error(SOURCE, e.to_string());
            }
        };

        let content_result = self.delegate.fetch(&content_key, output).await;
        if !content_result.is_success() {
            trace!(
                rule_key = %rule_key,
                content_key = %content_key,
                result = %content_result.result_type(),
                "Missed second-level lookup"
            );
            self.counters.misses.inc();
            return content_result;
        }

        if let Some(source) = content_result.cache_source() {
            self.counters.hit_types.add(source);
        }
        if let Some(size) = content_result.artifact_size_bytes() {
            self.counters.hit_bytes.add_sample(size);
        }
        trace!(
            rule_key = %rule_key,
            content_key = %content_key,
            metadata = ?content_result.metadata(),
            "Found a second-level artifact"
        );

        fetch_result
    }

    async fn store(&self, info: &ArtifactInfo, output: &BorrowablePath) -> Result<()> {
        if self.attempt_two_level_store(info, output).await? {
            return Ok(());
        }
        self.delegate.store(info, output).await
    }

    fn cache_read_mode(&self) -> CacheReadMode {
        self.delegate.cache_read_mode()
    }

    fn close(&self) {
        self.delegate.close();
        if let Err(e) = self.filesystem.delete_file(&self.empty_file) {
            debug!(
                path = %self.empty_file.display(),
                error = %e,
                "Failed to delete two-level cache marker file"
            );
        }
    }
}

impl CacheDecorator for TwoLevelArtifactCacheDecorator {
    fn delegate(&self) -> &Arc<dyn ArtifactCache> {
        &self.delegate
    }
}
