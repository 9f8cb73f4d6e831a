//! Artifact caching for build outputs
//!
//! This crate maps build-rule fingerprints ([`RuleKey`]) to build outputs:
//! - [`ArtifactCache`]: the backend contract every cache implements
//! - [`DirArtifactCache`]: a local directory backend
//! - [`TwoLevelArtifactCacheDecorator`]: content-addressed indirection over
//!   any backend, so identical outputs under different keys are transferred once
//!
//! # Two-level layout
//!
//! With two-level stores enabled, an eligible artifact is stored as:
//!
//! ```text
//! rule key     -> (metadata + TWO_LEVEL_CACHE_CONTENT_HASH, empty marker)
//! content key  -> artifact bytes
//! ```
//!
//! Fetches follow the pointer transparently and fall back to plain entries,
//! so both layouts can share a backend.
//!
//! # Usage
//!
//! ```rust,no_run
//! use buildcache::{ArtifactCacheConfig, LocalFilesystem, create_artifact_cache};
//! use buildcache_counters::InMemoryCounterRegistry;
//! use std::sync::Arc;
//!
//! let config = ArtifactCacheConfig::from_toml_str("[two_level]\nenabled = true\n")?;
//! let registry = InMemoryCounterRegistry::new();
//! let cache = create_artifact_cache(
//!     &config,
//!     Arc::new(LocalFilesystem::new("/path/to/project")),
//!     &registry,
//! )?;
//! # let _ = cache;
//! # Ok::<(), buildcache::Error>(())
//! ```

mod artifact;
mod backend;
pub mod config;
mod dir;
mod error;
pub mod filesystem;
mod result;
pub mod two_level;

pub use artifact::{ArtifactInfo, ArtifactInfoBuilder, BorrowablePath, RuleKey};
pub use backend::{ArtifactCache, CacheDecorator, NoopArtifactCache};
pub use config::{ArtifactCacheConfig, CacheMode, TwoLevelCacheConfig};
pub use dir::DirArtifactCache;
pub use error::{Error, Result};
pub use filesystem::{LocalFilesystem, ProjectFilesystem};
pub use result::{CacheReadMode, CacheResult, CacheResultType};
pub use two_level::{METADATA_KEY, TwoLevelArtifactCacheDecorator, TwoLevelCounters};

use buildcache_counters::CounterRegistry;
use std::sync::Arc;

/// Build the artifact cache described by `config`
///
/// Directory caches are always wrapped in the two-level decorator: the
/// `two_level.enabled` flag only gates stores, and pointer entries written by
/// other clients must still resolve on fetch.
///
/// # Errors
///
/// Returns a configuration error for an invalid config, or
/// [`Error::ScratchFile`] if the decorator cannot create its marker file.
pub fn create_artifact_cache(
    config: &ArtifactCacheConfig,
    filesystem: Arc<dyn ProjectFilesystem>,
    registry: &dyn CounterRegistry,
) -> Result<Arc<dyn ArtifactCache>> {
    config.validate()?;

    let backend: Arc<dyn ArtifactCache> = match config.mode {
        CacheMode::None => {
            tracing::debug!("Artifact caching disabled");
            return Ok(Arc::new(NoopArtifactCache::new()));
        }
        CacheMode::Dir => Arc::new(DirArtifactCache::new(&config.dir, config.read_mode)),
    };

    let decorator =
        TwoLevelArtifactCacheDecorator::new(backend, filesystem, registry, config.two_level)?;
    Ok(Arc::new(decorator))
}
