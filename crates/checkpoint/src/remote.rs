//! URL-addressed checkpoint backend
//!
//! Serves `file://` URLs, `s3://bucket/prefix` URLs (with the `s3` feature)
//! and bare paths. Because it also accepts bare paths it overlaps the
//! filesystem backend, which is registered ahead of it and wins those ties.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use runtime_core::{Error, LocalSettings, Result, StorageConfig};
use storage::{LocalStorage, StorageBackend};
use tracing::{debug, instrument};
use uuid::Uuid;

#[cfg(feature = "s3")]
use storage::{S3Config, S3Storage};

use crate::id::CheckpointId;
use crate::session::{
    check_item_key, BackendKind, CheckpointBackend, StorageReader, StorageSession, StorageWriter,
    METADATA_FILE,
};

/// Where a remote checkpoint lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLocation {
    /// Directory on a local or mounted filesystem
    Local(PathBuf),

    /// Key prefix inside an S3 bucket
    #[cfg(feature = "s3")]
    S3 { bucket: String, prefix: String },
}

impl RemoteLocation {
    /// Parse an identifier into a location this backend can open
    pub fn parse(checkpoint_id: &CheckpointId) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidConfig {
            message: format!("{} ({:?})", reason, checkpoint_id.as_str()),
        };

        if checkpoint_id.is_empty() {
            return Err(invalid("empty checkpoint identifier"));
        }

        let raw = match checkpoint_id {
            CheckpointId::Path(path) => return Ok(RemoteLocation::Local(path.clone())),
            CheckpointId::Raw(raw) => raw,
        };

        let Some(scheme) = checkpoint_id.scheme() else {
            if raw.contains("://") {
                return Err(invalid("malformed URL"));
            }
            return Ok(RemoteLocation::Local(PathBuf::from(raw)));
        };
        let rest = checkpoint_id.without_scheme().unwrap_or_default();

        match scheme {
            "file" => {
                if rest.is_empty() {
                    return Err(invalid("file URL without a path"));
                }
                Ok(RemoteLocation::Local(PathBuf::from(rest)))
            }
            #[cfg(feature = "s3")]
            "s3" => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(invalid("s3 URL without a bucket"));
                }
                Ok(RemoteLocation::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                })
            }
            _ => Err(invalid("unsupported URL scheme")),
        }
    }

    /// Settings from the environment that this location depends on
    ///
    /// Local locations read only the local keys; object store settings are
    /// loaded and validated for `s3://` locations alone.
    pub fn config_from_env(&self) -> Result<StorageConfig> {
        match self {
            RemoteLocation::Local(_) => Ok(StorageConfig {
                local: LocalSettings::from_env()?,
                ..StorageConfig::default()
            }),
            #[cfg(feature = "s3")]
            RemoteLocation::S3 { .. } => StorageConfig::from_env(),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            RemoteLocation::Local(_) => "file",
            #[cfg(feature = "s3")]
            RemoteLocation::S3 { .. } => "s3",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OpenMode {
    Create,
    Existing,
}

fn connect(
    location: &RemoteLocation,
    config: &StorageConfig,
    mode: OpenMode,
) -> Result<Arc<dyn StorageBackend>> {
    match location {
        RemoteLocation::Local(path) => {
            let storage = LocalStorage::new(path).with_sync_files(config.local.sync_files);
            match mode {
                OpenMode::Create => storage.create_root()?,
                OpenMode::Existing => storage.require_root()?,
            }
            Ok(Arc::new(storage))
        }
        #[cfg(feature = "s3")]
        RemoteLocation::S3 { bucket, prefix } => {
            let storage = S3Storage::new(S3Config {
                bucket: bucket.clone(),
                prefix: (!prefix.is_empty()).then(|| prefix.clone()),
                settings: config.s3.clone(),
                retry: config.retry.clone(),
            })?;
            Ok(Arc::new(storage))
        }
    }
}

/// Saves checkpoint items to a URL-addressed location
#[derive(Debug)]
pub struct RemoteWriter {
    checkpoint_id: CheckpointId,
    location: RemoteLocation,
    medium: Arc<dyn StorageBackend>,
    config: StorageConfig,
    save_id: Option<Uuid>,
    written: Mutex<BTreeSet<String>>,
}

impl RemoteWriter {
    pub fn new(checkpoint_id: impl Into<CheckpointId>, config: StorageConfig) -> Result<Self> {
        let checkpoint_id = checkpoint_id.into();
        let location = RemoteLocation::parse(&checkpoint_id)?;
        let medium = connect(&location, &config, OpenMode::Create)?;
        debug!(%checkpoint_id, medium = medium.name(), "Remote writer connected");

        Ok(Self {
            checkpoint_id,
            location,
            medium,
            config,
            save_id: None,
            written: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }
}

impl CheckpointBackend for RemoteWriter {
    const KIND: BackendKind = BackendKind::Remote;

    fn validate_checkpoint_id(checkpoint_id: &CheckpointId) -> bool {
        RemoteLocation::parse(checkpoint_id).is_ok()
    }

    fn open(checkpoint_id: &CheckpointId) -> Result<Self> {
        let config = RemoteLocation::parse(checkpoint_id)?.config_from_env()?;
        Self::new(checkpoint_id.clone(), config)
    }
}

impl StorageSession for RemoteWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn checkpoint_id(&self) -> &CheckpointId {
        &self.checkpoint_id
    }

    fn session_id(&self) -> Option<Uuid> {
        self.save_id
    }

    fn reset(&mut self, checkpoint_id: &CheckpointId) -> Result<()> {
        if *checkpoint_id != self.checkpoint_id {
            let location = RemoteLocation::parse(checkpoint_id)?;
            self.medium = connect(&location, &self.config, OpenMode::Create)?;
            self.location = location;
            self.checkpoint_id = checkpoint_id.clone();
        }
        self.written.lock().clear();
        self.save_id = Some(Uuid::new_v4());
        Ok(())
    }
}

#[async_trait]
impl StorageWriter for RemoteWriter {
    #[instrument(skip(self, data), fields(backend = "remote", scheme = self.location.scheme(), size = data.len()))]
    async fn write_item(&self, key: &str, data: Bytes) -> Result<u64> {
        check_item_key(key)?;
        let size = self.medium.write(key, data).await?;
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

/// Loads checkpoint items from a URL-addressed location
#[derive(Debug)]
pub struct RemoteReader {
    checkpoint_id: CheckpointId,
    location: RemoteLocation,
    medium: Arc<dyn StorageBackend>,
    config: StorageConfig,
    load_id: Option<Uuid>,
    metadata: RwLock<Option<Bytes>>,
}

impl RemoteReader {
    pub fn new(checkpoint_id: impl Into<CheckpointId>, config: StorageConfig) -> Result<Self> {
        let checkpoint_id = checkpoint_id.into();
        let location = RemoteLocation::parse(&checkpoint_id)?;
        let medium = connect(&location, &config, OpenMode::Existing)?;
        debug!(%checkpoint_id, medium = medium.name(), "Remote reader connected");

        Ok(Self {
            checkpoint_id,
            location,
            medium,
            config,
            load_id: None,
            metadata: RwLock::new(None),
        })
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }
}

impl CheckpointBackend for RemoteReader {
    const KIND: BackendKind = BackendKind::Remote;

    fn validate_checkpoint_id(checkpoint_id: &CheckpointId) -> bool {
        RemoteLocation::parse(checkpoint_id).is_ok()
    }

    fn open(checkpoint_id: &CheckpointId) -> Result<Self> {
        let config = RemoteLocation::parse(checkpoint_id)?.config_from_env()?;
        Self::new(checkpoint_id.clone(), config)
    }
}

impl StorageSession for RemoteReader {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn checkpoint_id(&self) -> &CheckpointId {
        &self.checkpoint_id
    }

    fn session_id(&self) -> Option<Uuid> {
        self.load_id
    }

    fn reset(&mut self, checkpoint_id: &CheckpointId) -> Result<()> {
        if *checkpoint_id != self.checkpoint_id {
            let location = RemoteLocation::parse(checkpoint_id)?;
            self.medium = connect(&location, &self.config, OpenMode::Existing)?;
            self.location = location;
            self.checkpoint_id = checkpoint_id.clone();
        }
        *self.metadata.write() = None;
        self.load_id = Some(Uuid::new_v4());
        Ok(())
    }
}

#[async_trait]
impl StorageReader for RemoteReader {
    async fn read_metadata(&self) -> Result<Bytes> {
        let cached = self.metadata.read().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let data = self
            .medium
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

    #[instrument(skip(self), fields(backend = "remote", scheme = self.location.scheme()))]
    async fn read_item(&self, key: &str) -> Result<Bytes> {
        check_item_key(key)?;
        self.medium.read(key).await
    }

    async fn list_items(&self) -> Result<Vec<String>> {
        self.medium.list("").await
    }
}
