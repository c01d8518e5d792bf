//! Key-addressed blob storage.
//!
//! Every write is a whole-object replace; readers see either the previous
//! object or the new one, never a partial write. Conditional writes
//! ([`PutCondition`]) are the only coordination primitive offered: the
//! caches in this crate build compare-and-swap loops on top of them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use idt_schemas::MAX_BLOB_KEY_LEN;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Metadata returned by a cheap existence probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// A full read: payload, metadata and the content tag used for CAS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub meta: BlobMeta,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub key: String,
    pub meta: BlobMeta,
}

/// Precondition for [`BlobStore::put_if`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional replace.
    Any,
    /// Only if no object exists under the key.
    Absent,
    /// Only if the current object's etag equals this value.
    Matches(String),
}

/// Lowercase hex SHA-256 of the content.
pub fn etag_for(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Keys map directly to file names, so anything that could escape the root
/// or collide with internal files is refused.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key.len() > MAX_BLOB_KEY_LEN;
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Existence and metadata probe; never downloads the payload.
    async fn head(&self, key: &str) -> Result<Option<BlobMeta>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError>;

    /// Write `bytes` under `key` if `cond` holds.
    ///
    /// Returns `Ok(None)` when the precondition failed; nothing was written.
    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        cond: PutCondition,
    ) -> Result<Option<BlobMeta>, StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<BlobMeta, StoreError> {
        self.put_if(key, bytes, PutCondition::Any)
            .await?
            .ok_or_else(|| StoreError::Persistence(format!("unconditional put of '{key}' was rejected")))
    }

    /// Delete every key that exists. Missing keys are skipped. Returns how
    /// many objects were removed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// All objects, sorted by key.
    async fn list(&self) -> Result<Vec<BlobEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

const LOCK_DIR: &str = ".locks";
const TEMP_PREFIX: &str = ".tmp-";
/// Matches the default store write deadline: a waiter gives up no earlier
/// than a crashed writer's lock becomes breakable.
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(10);
/// Temp files older than this belong to writes that were cancelled.
const STALE_TEMP_AFTER: Duration = Duration::from_secs(60);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One file per key under `root`.
///
/// Writes land in a hidden temp file that is renamed over the target.
/// Conditional writes serialize on `.locks/<key>.lock`, created with
/// `create_new`; a lock older than `lock_stale_after` is assumed to belong
/// to a crashed writer and is broken. Keep `lock_stale_after` no longer
/// than the write deadline callers apply.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    lock_stale_after: Duration,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(LOCK_DIR))
            .await
            .map_err(|e| StoreError::persistence(&format!("create store root {}", root.display()), e))?;
        sweep_stale_temp_files(&root).await?;
        Ok(Self {
            root,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        })
    }

    pub fn with_lock_stale_after(mut self, d: Duration) -> Self {
        self.lock_stale_after = d;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn meta_at(path: &Path) -> Result<Option<BlobMeta>, StoreError> {
        match tokio::fs::metadata(path).await {
            Ok(m) => {
                let modified = m
                    .modified()
                    .map_err(|e| StoreError::persistence("read mtime", e))?;
                Ok(Some(BlobMeta {
                    last_modified: DateTime::<Utc>::from(modified),
                    size: m.len(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::persistence(&format!("stat {}", path.display()), e)),
        }
    }

    async fn read_at(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::persistence(&format!("read {}", path.display()), e)),
        }
    }

    async fn write_atomic(&self, key: &str, path: &Path, bytes: &[u8]) -> Result<BlobMeta, StoreError> {
        let mut tmp = TempFile {
            path: self.root.join(format!("{TEMP_PREFIX}{key}-{}", uuid::Uuid::new_v4())),
            committed: false,
        };

        let res = async {
            let mut f = tokio::fs::File::create(&tmp.path).await?;
            f.write_all(bytes).await?;
            f.sync_all().await?;
            drop(f);
            tokio::fs::rename(&tmp.path, path).await
        }
        .await;

        match res {
            Ok(()) => tmp.committed = true,
            Err(e) => return Err(StoreError::persistence(&format!("write {key}"), e)),
        }

        Self::meta_at(path)
            .await?
            .ok_or_else(|| StoreError::Persistence(format!("'{key}' vanished right after write")))
    }

    async fn acquire_lock(&self, key: &str) -> Result<LockFile, StoreError> {
        let path = self.root.join(LOCK_DIR).join(format!("{key}.lock"));
        loop {
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(_) => return Ok(LockFile { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.break_stale_lock(key, &path).await {
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => return Err(StoreError::persistence(&format!("lock {key}"), e)),
            }
        }
    }

    /// Move a stale lock aside, then confirm on the moved file that it really
    /// was stale. If another writer re-took the lock in between, the fresh
    /// lock is linked back into place instead of being deleted.
    async fn break_stale_lock(&self, key: &str, path: &Path) -> bool {
        if !self.lock_is_stale(path).await {
            return false;
        }
        let aside = path.with_extension(format!("stale-{}", uuid::Uuid::new_v4()));
        if tokio::fs::rename(path, &aside).await.is_err() {
            // Released or already broken by someone else; just retry.
            return true;
        }
        if self.lock_is_stale(&aside).await {
            warn!(key, "breaking stale blob lock");
            let _ = tokio::fs::remove_file(&aside).await;
            return true;
        }
        debug!(key, "lock was re-taken while breaking it; restoring");
        let _ = tokio::fs::hard_link(&aside, path).await;
        let _ = tokio::fs::remove_file(&aside).await;
        false
    }

    async fn lock_is_stale(&self, path: &Path) -> bool {
        let Ok(m) = tokio::fs::metadata(path).await else {
            return false;
        };
        m.modified()
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age > self.lock_stale_after)
    }
}

/// Delete leftovers of writes cancelled between create and rename.
async fn sweep_stale_temp_files(root: &Path) -> Result<(), StoreError> {
    let mut rd = tokio::fs::read_dir(root)
        .await
        .map_err(|e| StoreError::persistence("scan store root", e))?;
    let mut swept = 0usize;
    while let Some(entry) = rd
        .next_entry()
        .await
        .map_err(|e| StoreError::persistence("scan store root", e))?
    {
        if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let old = match entry.metadata().await {
            Ok(m) => m
                .modified()
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age > STALE_TEMP_AFTER),
            Err(_) => false,
        };
        if old && tokio::fs::remove_file(entry.path()).await.is_ok() {
            swept += 1;
        }
    }
    if swept > 0 {
        info!(swept, "removed abandoned temp files");
    }
    Ok(())
}

/// Removed on drop unless renamed into place, so a write cancelled by its
/// deadline does not leave the temp file behind.
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Held for the duration of a conditional write.
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn head(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let path = self.path_for(key)?;
        Self::meta_at(&path).await
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        let path = self.path_for(key)?;
        let Some(bytes) = Self::read_at(&path).await? else {
            return Ok(None);
        };
        let Some(meta) = Self::meta_at(&path).await? else {
            return Ok(None);
        };
        let etag = etag_for(&bytes);
        Ok(Some(Blob { bytes, meta, etag }))
    }

    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        cond: PutCondition,
    ) -> Result<Option<BlobMeta>, StoreError> {
        let path = self.path_for(key)?;

        if cond == PutCondition::Any {
            return self.write_atomic(key, &path, &bytes).await.map(Some);
        }

        let _lock = self.acquire_lock(key).await?;
        let current = Self::read_at(&path).await?;
        let holds = match (&cond, &current) {
            (PutCondition::Absent, None) => true,
            (PutCondition::Matches(tag), Some(cur)) => etag_for(cur) == *tag,
            _ => false,
        };
        if !holds {
            debug!(key, "conditional put precondition failed");
            return Ok(None);
        }
        self.write_atomic(key, &path, &bytes).await.map(Some)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in keys {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::persistence(&format!("delete {key}"), e)),
            }
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<BlobEntry>, StoreError> {
        let mut rd = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::persistence("list store root", e))?;

        let mut out = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| StoreError::persistence("list store root", e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(meta) = Self::meta_at(&entry.path()).await? {
                out.push(BlobEntry { key: name, meta });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// In-memory store (tests)
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "testkit"))]
pub use memory::MemoryBlobStore;

#[cfg(any(test, feature = "testkit"))]
mod memory {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard};

    use super::*;

    #[derive(Debug, Clone)]
    struct Entry {
        bytes: Vec<u8>,
        last_modified: DateTime<Utc>,
    }

    /// Process-local store with knobs for freshness and failure tests.
    #[derive(Debug, Default)]
    pub struct MemoryBlobStore {
        inner: Mutex<State>,
    }

    #[derive(Debug, Default)]
    struct State {
        objects: BTreeMap<String, Entry>,
        fail_writes: bool,
        writes: usize,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.inner.lock().unwrap_or_else(|p| p.into_inner())
        }

        /// Push `last_modified` of `key` back by `age`. Returns false if the
        /// key does not exist.
        pub fn backdate(&self, key: &str, age: chrono::Duration) -> bool {
            match self.state().objects.get_mut(key) {
                Some(e) => {
                    e.last_modified -= age;
                    true
                }
                None => false,
            }
        }

        /// Make every subsequent write fail with a persistence error.
        pub fn set_fail_writes(&self, fail: bool) {
            self.state().fail_writes = fail;
        }

        /// Number of successful writes so far.
        pub fn write_count(&self) -> usize {
            self.state().writes
        }

        pub fn keys(&self) -> Vec<String> {
            self.state().objects.keys().cloned().collect()
        }

        pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
            self.state().objects.get(key).map(|e| e.bytes.clone())
        }

        /// Plant bytes directly, bypassing write accounting.
        pub fn insert_raw(&self, key: &str, bytes: &[u8]) {
            self.state().objects.insert(
                key.to_string(),
                Entry {
                    bytes: bytes.to_vec(),
                    last_modified: Utc::now(),
                },
            );
        }
    }

    fn meta_of(e: &Entry) -> BlobMeta {
        BlobMeta {
            last_modified: e.last_modified,
            size: e.bytes.len() as u64,
        }
    }

    #[async_trait::async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn head(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
            validate_key(key)?;
            Ok(self.state().objects.get(key).map(meta_of))
        }

        async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
            validate_key(key)?;
            Ok(self.state().objects.get(key).map(|e| Blob {
                bytes: e.bytes.clone(),
                meta: meta_of(e),
                etag: etag_for(&e.bytes),
            }))
        }

        async fn put_if(
            &self,
            key: &str,
            bytes: Vec<u8>,
            cond: PutCondition,
        ) -> Result<Option<BlobMeta>, StoreError> {
            validate_key(key)?;
            let mut st = self.state();
            if st.fail_writes {
                return Err(StoreError::Persistence(format!("injected write failure for '{key}'")));
            }
            let holds = match (&cond, st.objects.get(key)) {
                (PutCondition::Any, _) => true,
                (PutCondition::Absent, None) => true,
                (PutCondition::Matches(tag), Some(cur)) => etag_for(&cur.bytes) == *tag,
                _ => false,
            };
            if !holds {
                return Ok(None);
            }
            let entry = Entry {
                bytes,
                last_modified: Utc::now(),
            };
            let meta = meta_of(&entry);
            st.objects.insert(key.to_string(), entry);
            st.writes += 1;
            Ok(Some(meta))
        }

        async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError> {
            let mut st = self.state();
            if st.fail_writes {
                return Err(StoreError::Persistence("injected delete failure".to_string()));
            }
            Ok(keys.iter().filter(|k| st.objects.remove(k.as_str()).is_some()).count())
        }

        async fn list(&self) -> Result<Vec<BlobEntry>, StoreError> {
            Ok(self
                .state()
                .objects
                .iter()
                .map(|(k, e)| BlobEntry {
                    key: k.clone(),
                    meta: meta_of(e),
                })
                .collect())
        }
    }
}
