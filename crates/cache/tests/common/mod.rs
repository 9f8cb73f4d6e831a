//! Shared fakes for artifact cache integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use buildcache::{
    ArtifactCache, ArtifactInfo, BorrowablePath, CacheReadMode, CacheResult, Error,
    LocalFilesystem, ProjectFilesystem, Result, RuleKey,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source tag reported on hits from [`RecordingCache`]
pub const MEMORY_SOURCE: &str = "memory";

/// One observed store call
#[derive(Debug, Clone)]
pub struct StoreCall {
    pub info: ArtifactInfo,
    pub path: PathBuf,
    pub borrowable: bool,
    pub payload: Vec<u8>,
}

/// In-memory backend that records every call and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<RuleKey, (BTreeMap<String, String>, Vec<u8>)>>,
    fetches: Mutex<Vec<RuleKey>>,
    stores: Mutex<Vec<StoreCall>>,
    failing_keys: Mutex<HashSet<RuleKey>>,
    scripted: Mutex<HashMap<RuleKey, CacheResult>>,
    fail_all_stores: Mutex<bool>,
    closes: AtomicUsize,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store that touches `key` fail after recording it
    pub fn fail_stores_for(&self, key: RuleKey) {
        self.failing_keys.lock().unwrap().insert(key);
    }

    /// Answer every fetch of `key` with `result`, whatever is stored
    pub fn respond_with(&self, key: RuleKey, result: CacheResult) {
        self.scripted.lock().unwrap().insert(key, result);
    }

    /// Make every store fail after recording it
    pub fn fail_all_stores(&self) {
        *self.fail_all_stores.lock().unwrap() = true;
    }

    /// Insert an entry directly, bypassing `store`
    pub fn insert(&self, key: RuleKey, metadata: BTreeMap<String, String>, payload: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key, (metadata, payload.to_vec()));
    }

    /// Drop an entry, as backend eviction would
    pub fn evict(&self, key: &RuleKey) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn contains(&self, key: &RuleKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn entry(&self, key: &RuleKey) -> Option<(BTreeMap<String, String>, Vec<u8>)> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn fetches(&self) -> Vec<RuleKey> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn stores(&self) -> Vec<StoreCall> {
        self.stores.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCache for RecordingCache {
    async fn fetch(&self, rule_key: &RuleKey, output: &Path) -> CacheResult {
        self.fetches.lock().unwrap().push(rule_key.clone());
        if let Some(result) = self.scripted.lock().unwrap().get(rule_key).cloned() {
            return result;
        }
        let entry = self.entries.lock().unwrap().get(rule_key).cloned();
        match entry {
            Some((metadata, payload)) => {
                if let Err(e) = tokio::fs::write(output, &payload).await {
                    return CacheResult::error(MEMORY_SOURCE, e.to_string());
                }
                CacheResult::hit(MEMORY_SOURCE, metadata, payload.len() as u64)
            }
            None => CacheResult::miss(),
        }
    }

    async fn store(&self, info: &ArtifactInfo, output: &BorrowablePath) -> Result<()> {
        let payload = tokio::fs::read(output.path())
            .await
            .map_err(|e| Error::io(e, output.path(), "read"))?;
        self.stores.lock().unwrap().push(StoreCall {
            info: info.clone(),
            path: output.path().to_path_buf(),
            borrowable: output.is_borrowable(),
            payload: payload.clone(),
        });

        let fail = *self.fail_all_stores.lock().unwrap()
            || info
                .rule_keys()
                .iter()
                .any(|k| self.failing_keys.lock().unwrap().contains(k));
        if fail {
            return Err(Error::backend(MEMORY_SOURCE, "injected store failure"));
        }

        let mut entries = self.entries.lock().unwrap();
        for key in info.rule_keys() {
            entries.insert(key.clone(), (info.metadata().clone(), payload.clone()));
        }
        Ok(())
    }

    fn cache_read_mode(&self) -> CacheReadMode {
        CacheReadMode::ReadWrite
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Which [`FaultyFilesystem`] operation should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Mkdirs,
    CreateTempFile,
    Hash,
    Delete,
}

/// Local filesystem with one operation forced to fail
#[derive(Debug)]
pub struct FaultyFilesystem {
    inner: LocalFilesystem,
    fault: Fault,
    deletes: AtomicUsize,
}

impl FaultyFilesystem {
    pub fn new(root: impl Into<PathBuf>, fault: Fault) -> Self {
        Self {
            inner: LocalFilesystem::new(root),
            fault,
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn delete_attempts(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn injected(&self, operation: &str) -> Error {
        Error::io_no_path(std::io::Error::other("injected fault"), operation)
    }
}

impl ProjectFilesystem for FaultyFilesystem {
    fn tmp_dir(&self) -> PathBuf {
        self.inner.tmp_dir()
    }

    fn mkdirs(&self, dir: &Path) -> Result<()> {
        if self.fault == Fault::Mkdirs {
            return Err(self.injected("create_dir_all"));
        }
        self.inner.mkdirs(dir)
    }

    fn create_temp_file(&self, dir: &Path, prefix: &str, suffix: &str) -> Result<PathBuf> {
        if self.fault == Fault::CreateTempFile {
            return Err(self.injected("create_temp_file"));
        }
        self.inner.create_temp_file(dir, prefix, suffix)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        self.inner.file_size(path)
    }

    fn compute_sha256(&self, path: &Path) -> Result<String> {
        if self.fault == Fault::Hash {
            return Err(self.injected("hash"));
        }
        self.inner.compute_sha256(path)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Delete {
            return Err(self.injected("remove_file"));
        }
        self.inner.delete_file(path)
    }
}

/// Write `len` bytes of deterministic content to `dir/name`
pub fn write_artifact(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, payload).unwrap();
    path
}

pub fn rule_key(hex: &str) -> RuleKey {
    RuleKey::new(hex).unwrap()
}

/// Route crate logs to the test writer; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("buildcache=trace"))
        .with_test_writer()
        .try_init();
}
