//! Local directory artifact cache
//!
//! Each entry is one file holding its metadata and payload, sharded by key
//! prefix to keep directories small:
//!
//! ```text
//! {root}/
//!   ab/
//!     cd/
//!       abcdef...      (entry)
//!   _short/
//!     ab               (keys shorter than four hex digits)
//! ```
//!
//! An entry file is laid out as
//!
//! ```text
//! ENTRY_MAGIC | metadata length (u64 LE) | metadata JSON | payload
//! ```
//!
//! Entries are written to a temporary sibling and renamed into place, so a
//! reader always sees metadata and payload from the same store. Eviction is
//! left to whoever owns the directory.

use crate::artifact::{ArtifactInfo, BorrowablePath, RuleKey};
use crate::backend::ArtifactCache;
use crate::result::{CacheReadMode, CacheResult};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

const SOURCE: &str = "dir";

const ENTRY_MAGIC: &[u8; 4] = b"BCE1";

/// Directory for keys too short to shard; never valid hex, so it cannot
/// collide with a shard directory
const SHORT_KEY_DIR: &str = "_short";

/// Upper bound on the metadata block, so a corrupt length never triggers a
/// huge allocation
const MAX_METADATA_LEN: u64 = 16 * 1024 * 1024;

/// Metadata block of an entry file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetadata {
    rule_key: RuleKey,
    metadata: BTreeMap<String, String>,
    size: u64,
    created_at: DateTime<Utc>,
}

/// Artifact cache backed by a local directory
#[derive(Debug, Clone)]
pub struct DirArtifactCache {
    root: PathBuf,
    read_mode: CacheReadMode,
}

impl DirArtifactCache {
    /// Create a cache rooted at `root`; the directory is created on first store
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, read_mode: CacheReadMode) -> Self {
        Self {
            root: root.into(),
            read_mode,
        }
    }

    /// Root directory of the cache
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry path for a key: `{root}/{key[0:2]}/{key[2:4]}/{key}`, or
    /// `{root}/_short/{key}` for keys shorter than four characters
    fn entry_path(&self, key: &RuleKey) -> PathBuf {
        let hex = key.as_str();
        if hex.len() < 4 {
            return self.root.join(SHORT_KEY_DIR).join(hex);
        }
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }

    async fn write_entry(
        &self,
        key: &RuleKey,
        metadata: &BTreeMap<String, String>,
        source: &Path,
        size: u64,
    ) -> Result<()> {
        let entry = self.entry_path(key);
        if let Some(parent) = entry.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        let stored = StoredMetadata {
            rule_key: key.clone(),
            metadata: metadata.clone(),
            size,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&stored)
            .map_err(|e| Error::serialization(format!("Failed to encode metadata: {e}")))?;

        let tmp = temp_sibling(&entry);
        let written = write_entry_file(&tmp, &json, source).await;
        let result = match written {
            Ok(()) => tokio::fs::rename(&tmp, &entry)
                .await
                .map_err(|e| Error::io(e, &entry, "rename")),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

async fn write_entry_file(path: &Path, metadata_json: &[u8], source: &Path) -> Result<()> {
    let mut file = File::create(path)
        .await
        .map_err(|e| Error::io(e, path, "create"))?;
    let mut header = Vec::with_capacity(ENTRY_MAGIC.len() + 8 + metadata_json.len());
    header.extend_from_slice(ENTRY_MAGIC);
    header.extend_from_slice(&(metadata_json.len() as u64).to_le_bytes());
    header.extend_from_slice(metadata_json);
    file.write_all(&header)
        .await
        .map_err(|e| Error::io(e, path, "write"))?;

    let mut input = File::open(source)
        .await
        .map_err(|e| Error::io(e, source, "open"))?;
    tokio::io::copy(&mut input, &mut file)
        .await
        .map_err(|e| Error::io(e, source, "copy"))?;
    file.flush()
        .await
        .map_err(|e| Error::io(e, path, "flush"))?;
    Ok(())
}

/// Read the header of an entry file, leaving `file` positioned at the payload
async fn read_header(file: &mut File) -> std::result::Result<StoredMetadata, String> {
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .await
        .map_err(|e| format!("truncated entry header: {e}"))?;
    if &magic != ENTRY_MAGIC {
        return Err("not a cache entry".to_string());
    }

    let mut len = [0u8; 8];
    file.read_exact(&mut len)
        .await
        .map_err(|e| format!("truncated entry header: {e}"))?;
    let len = u64::from_le_bytes(len);
    if len > MAX_METADATA_LEN {
        return Err(format!("metadata block of {len} bytes is too large"));
    }

    let mut json = vec![0u8; usize::try_from(len).map_err(|e| e.to_string())?];
    file.read_exact(&mut json)
        .await
        .map_err(|e| format!("truncated metadata: {e}"))?;
    serde_json::from_slice(&json).map_err(|e| format!("corrupt metadata: {e}"))
}

/// Unique temporary path next to `path`, so concurrent writers never collide
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{}.tmp", uuid::Uuid::new_v4()))
}

#[async_trait]
impl ArtifactCache for DirArtifactCache {
    async fn fetch(&self, rule_key: &RuleKey, output: &Path) -> CacheResult {
        let entry = self.entry_path(rule_key);
        // One open handle serves both header and payload, so a concurrent
        // overwrite can never mix two stores.
        let mut file = match File::open(&entry).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(rule_key = %rule_key, "Dir cache miss");
                return CacheResult::miss();
            }
            Err(e) => {
                return CacheResult::error(SOURCE, format!("failed to open {}: {e}", entry.display()));
            }
        };

        let stored = match read_header(&mut file).await {
            Ok(stored) => stored,
            Err(message) => {
                return CacheResult::error(SOURCE, format!("{}: {message}", entry.display()));
            }
        };

        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return CacheResult::error(
                    SOURCE,
                    format!("failed to create {}: {e}", parent.display()),
                );
            }
        }
        let copied = async {
            let mut out = File::create(output).await?;
            let size = tokio::io::copy(&mut file, &mut out).await?;
            out.flush().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;
        let size = match copied {
            Ok(size) => size,
            Err(e) => {
                return CacheResult::error(
                    SOURCE,
                    format!("failed to copy {} to {}: {e}", entry.display(), output.display()),
                );
            }
        };
        if size != stored.size {
            return CacheResult::error(
                SOURCE,
                format!(
                    "{} holds {size} payload bytes, expected {}",
                    entry.display(),
                    stored.size
                ),
            );
        }

        trace!(rule_key = %rule_key, size, "Dir cache hit");
        CacheResult::hit(SOURCE, stored.metadata, size)
    }

    async fn store(&self, info: &ArtifactInfo, output: &BorrowablePath) -> Result<()> {
        if !self.read_mode.is_writable() {
            trace!("Dir cache is read-only, skipping store");
            return Ok(());
        }

        let source = tokio::fs::metadata(output.path())
            .await
            .map_err(|e| Error::io(e, output.path(), "metadata"))?;
        if !source.is_file() {
            return Err(Error::backend(
                SOURCE,
                format!("{} is not a regular file", output.path().display()),
            ));
        }
        let size = source.len();
        for key in info.rule_keys() {
            self.write_entry(key, info.metadata(), output.path(), size)
                .await?;
        }

        debug!(
            keys = info.rule_keys().len(),
            size,
            root = %self.root.display(),
            "Stored artifact in dir cache"
        );
        Ok(())
    }

    fn cache_read_mode(&self) -> CacheReadMode {
        self.read_mode
    }

    fn close(&self) {}
}
