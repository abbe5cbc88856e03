//! JSON-file backend
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/negotiations/<negotiation_id>.json
//! <root>/versions/<version_id>.json
//! ```
//!
//! Every write goes to a uniquely named temp file first. Creates hard-link
//! it into place, which fails if the record exists; replacements rename it.
//! Readers never see a partially written record.

use super::{RecordKey, RecordKind, StorageBackend};
use crate::error::BackendError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = "json";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory of JSON records
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a backend rooted at `root`
    ///
    /// # Errors
    /// Returns `BackendError::Io` if the directories cannot be created
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, BackendError> {
        let backend = Self {
            root: root.as_ref().to_path_buf(),
        };
        for kind in [RecordKind::Negotiation, RecordKind::Version] {
            let dir = backend.dir_for(kind);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| BackendError::io_error(&dir, e))?;
        }
        Ok(backend)
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, kind: RecordKind) -> PathBuf {
        match kind {
            RecordKind::Negotiation => self.root.join("negotiations"),
            RecordKind::Version => self.root.join("versions"),
        }
    }

    /// Write `bytes` to a fresh temp file next to `path` and sync it
    async fn write_temp(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, BackendError> {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{EXTENSION}.{}.{seq}.tmp", std::process::id()));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| BackendError::io_error(&tmp, e))?;
        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BackendError::io_error(&tmp, e));
        }
        Ok(tmp)
    }

    /// Path of the file holding `key`
    #[must_use]
    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.dir_for(key.kind())
            .join(format!("{}.{EXTENSION}", key.name()))
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn create(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError> {
        let path = self.path_for(key);
        let tmp = self.write_temp(&path, &bytes).await?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
        }
        linked.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BackendError::AlreadyExists(key.clone()),
            _ => BackendError::io_error(&path, e),
        })
    }

    async fn put(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError> {
        let path = self.path_for(key);
        let tmp = self.write_temp(&path, &bytes).await?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            // Best effort; the temp file is ignored by `list` either way
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BackendError::io_error(&path, e));
        }
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, BackendError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io_error(&path, e)),
        }
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<RecordKey>, BackendError> {
        let dir = self.dir_for(kind);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| BackendError::io_error(&dir, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::io_error(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match RecordKey::from_name(kind, name) {
                Some(key) => keys.push(key),
                None => tracing::warn!(path = %path.display(), "ignoring unrecognized record file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
