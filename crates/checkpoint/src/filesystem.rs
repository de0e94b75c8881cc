//! Filesystem checkpoint backend
//!
//! The default backend for both roles. A checkpoint is a directory; every
//! item is a file below it, written atomically through [`LocalStorage`].

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use runtime_core::{Error, LocalSettings, Result};
use storage::{LocalStorage, StorageBackend};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::id::CheckpointId;
use crate::session::{
    check_item_key, BackendKind, CheckpointBackend, StorageReader, StorageSession, StorageWriter,
    METADATA_FILE,
};

/// Whether the filesystem backend can serve `checkpoint_id`
///
/// Typed paths are always accepted. Raw strings are accepted unless they look
/// like URLs, provided some ancestor directory exists and is writable.
pub fn accepts_checkpoint_id(checkpoint_id: &CheckpointId) -> bool {
    match checkpoint_id {
        CheckpointId::Path(_) => true,
        CheckpointId::Raw(raw) => {
            if raw.contains("://") {
                return false;
            }
            Path::new(raw).ancestors().skip(1).any(|ancestor| {
                let ancestor = if ancestor.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    ancestor
                };
                is_writable(ancestor)
            })
        }
    }
}

fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

/// Saves checkpoint items into a local directory
#[derive(Debug)]
pub struct FileSystemWriter {
    checkpoint_id: CheckpointId,
    storage: LocalStorage,
    sync_files: bool,
    save_id: Option<Uuid>,
    written: Mutex<BTreeSet<String>>,
}

impl FileSystemWriter {
    /// Create a writer rooted at `checkpoint_id`, creating the directory
    pub fn new(checkpoint_id: impl Into<CheckpointId>, settings: &LocalSettings) -> Result<Self> {
        let checkpoint_id = checkpoint_id.into();
        let sync_files = settings.sync_files;
        let storage = Self::root(&checkpoint_id, sync_files)?;

        Ok(Self {
            checkpoint_id,
            storage,
            sync_files,
            save_id: None,
            written: Mutex::new(BTreeSet::new()),
        })
    }

    fn root(checkpoint_id: &CheckpointId, sync_files: bool) -> Result<LocalStorage> {
        let storage = LocalStorage::new(checkpoint_id.to_path()).with_sync_files(sync_files);
        storage.create_root()?;
        debug!(path = ?storage.base_path(), "Checkpoint directory ready");
        Ok(storage)
    }

    /// Directory this writer saves into
    pub fn path(&self) -> &Path {
        self.storage.base_path()
    }
}

impl CheckpointBackend for FileSystemWriter {
    const KIND: BackendKind = BackendKind::FileSystem;

    fn validate_checkpoint_id(checkpoint_id: &CheckpointId) -> bool {
        accepts_checkpoint_id(checkpoint_id)
    }

    fn open(checkpoint_id: &CheckpointId) -> Result<Self> {
        let settings = LocalSettings::from_env()?;
        Self::new(checkpoint_id.clone(), &settings)
    }
}

impl StorageSession for FileSystemWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }

    fn checkpoint_id(&self) -> &CheckpointId {
        &self.checkpoint_id
    }

    fn session_id(&self) -> Option<Uuid> {
        self.save_id
    }

    fn reset(&mut self, checkpoint_id: &CheckpointId) -> Result<()> {
        if *checkpoint_id != self.checkpoint_id {
            self.storage = Self::root(checkpoint_id, self.sync_files)?;
            self.checkpoint_id = checkpoint_id.clone();
        }
        self.written.lock().clear();
        self.save_id = Some(Uuid::new_v4());
        debug!(checkpoint_id = %self.checkpoint_id, save_id = ?self.save_id, "Writer session reset");
        Ok(())
    }
}

#[async_trait]
impl StorageWriter for FileSystemWriter {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn write_item(&self, key: &str, data: Bytes) -> Result<u64> {
        check_item_key(key)?;
        let size = self.storage.write(key, data).await?;
        self.written.lock().insert(key.to_string());
        Ok(size)
    }

    async fn write_metadata(&self, data: Bytes) -> Result<u64> {
        self.write_item(METADATA_FILE, data).await
    }

    async fn finish(&self) -> Result<Vec<String>> {
        Ok(self.written.lock().iter().cloned().collect())
    }
}

/// Loads checkpoint items from a local directory
#[derive(Debug)]
pub struct FileSystemReader {
    checkpoint_id: CheckpointId,
    storage: LocalStorage,
    load_id: Option<Uuid>,
    metadata: RwLock<Option<Bytes>>,
}

impl FileSystemReader {
    /// Create a reader for an existing checkpoint directory
    pub fn new(checkpoint_id: impl Into<CheckpointId>) -> Result<Self> {
        let checkpoint_id = checkpoint_id.into();
        let storage = Self::root(&checkpoint_id)?;

        Ok(Self {
            checkpoint_id,
            storage,
            load_id: None,
            metadata: RwLock::new(None),
        })
    }

    fn root(checkpoint_id: &CheckpointId) -> Result<LocalStorage> {
        let storage = LocalStorage::new(checkpoint_id.to_path());
        storage.require_root()?;
        Ok(storage)
    }

    /// Directory this reader loads from
    pub fn path(&self) -> &Path {
        self.storage.base_path()
    }
}

impl CheckpointBackend for FileSystemReader {
    const KIND: BackendKind = BackendKind::FileSystem;

    fn validate_checkpoint_id(checkpoint_id: &CheckpointId) -> bool {
        accepts_checkpoint_id(checkpoint_id)
    }

    fn open(checkpoint_id: &CheckpointId) -> Result<Self> {
        Self::new(checkpoint_id.clone())
    }
}

impl StorageSession for FileSystemReader {
    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }

    fn checkpoint_id(&self) -> &CheckpointId {
        &self.checkpoint_id
    }

    fn session_id(&self) -> Option<Uuid> {
        self.load_id
    }

    fn reset(&mut self, checkpoint_id: &CheckpointId) -> Result<()> {
        if *checkpoint_id != self.checkpoint_id {
            self.storage = Self::root(checkpoint_id)?;
            self.checkpoint_id = checkpoint_id.clone();
        }
        *self.metadata.write() = None;
        self.load_id = Some(Uuid::new_v4());
        debug!(checkpoint_id = %self.checkpoint_id, load_id = ?self.load_id, "Reader session reset");
        Ok(())
    }
}

#[async_trait]
impl StorageReader for FileSystemReader {
    async fn read_metadata(&self) -> Result<Bytes> {
        let cached = self.metadata.read().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let data = self
            .storage
            .read(METADATA_FILE)
            .await
            .map_err(|e| match e {
                Error::StoragePathNotFound { .. } => Error::CheckpointNotFound {
                    checkpoint_id: self.checkpoint_id.to_string(),
                },
                other => other,
            })?;
        *self.metadata.write() = Some(data.clone());
        Ok(data)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_item(&self, key: &str) -> Result<Bytes> {
        check_item_key(key)?;
        self.storage.read(key).await
    }

    async fn list_items(&self) -> Result<Vec<String>> {
        self.storage.list("").await
    }
}
