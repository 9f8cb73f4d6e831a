//! Filesystem port used by caches
//!
//! Caches only touch the project filesystem through [`ProjectFilesystem`], so
//! tests can substitute failing or instrumented implementations.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Directory under the project root holding build scratch files
const SCRATCH_ROOT: &str = "buildcache-out";

/// Filesystem operations the caches depend on
pub trait ProjectFilesystem: Send + Sync {
    /// Project-scoped scratch directory
    fn tmp_dir(&self) -> PathBuf;

    /// Create `dir` and all missing parents
    fn mkdirs(&self, dir: &Path) -> Result<()>;

    /// Create a new empty file in `dir` whose name starts with `prefix` and
    /// ends with `suffix`, and return its path
    ///
    /// The file outlives the call; removing it is the caller's job.
    fn create_temp_file(&self, dir: &Path, prefix: &str, suffix: &str) -> Result<PathBuf>;

    /// Size of the file at `path` in bytes
    fn file_size(&self, path: &Path) -> Result<u64>;

    /// Lowercase hex SHA-256 of the file's contents
    fn compute_sha256(&self, path: &Path) -> Result<String>;

    /// Remove the file at `path`; a missing file is not an error
    fn delete_file(&self, path: &Path) -> Result<()>;
}

/// [`ProjectFilesystem`] backed by the local disk
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    /// Create a filesystem rooted at the project directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProjectFilesystem for LocalFilesystem {
    fn tmp_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_ROOT).join("tmp")
    }

    fn mkdirs(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))
    }

    fn create_temp_file(&self, dir: &Path, prefix: &str, suffix: &str) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)
            .map_err(|e| Error::io(e, dir, "create_temp_file"))?;
        let (_, path) = file
            .keep()
            .map_err(|e| Error::io(e.error, dir, "persist_temp_file"))?;
        Ok(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| Error::io(e, path, "metadata"))
    }

    fn compute_sha256(&self, path: &Path) -> Result<String> {
        let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .map_err(|e| Error::io(e, path, "read"))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(e, path, "remove_file")),
        }
    }
}
