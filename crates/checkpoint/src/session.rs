//! Capability interface shared by every checkpoint storage backend
//!
//! A backend serves one or both roles:
//! - [`StorageWriter`] saves items of a new checkpoint
//! - [`StorageReader`] loads items of an existing checkpoint
//!
//! Both extend [`StorageSession`], which carries the per-session state the
//! resolver initialises through [`StorageSession::reset`]. The static half of
//! the contract (identifier validation and construction) lives in
//! [`CheckpointBackend`] so that trait objects stay object safe.

use std::fmt;
use std::path::{Component, Path};

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Error, Result, StorageRole};
use uuid::Uuid;

use crate::id::CheckpointId;

/// Name of the global metadata item at the root of a checkpoint
pub const METADATA_FILE: &str = ".metadata";

/// Tag identifying a backend implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Local (or locally mounted) filesystem
    FileSystem,

    /// URL-addressed storage (`file://`, `s3://`)
    Remote,

    /// Backend supplied outside this crate
    Custom(&'static str),
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::FileSystem => "filesystem",
            BackendKind::Remote => "remote",
            BackendKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State common to readers and writers
pub trait StorageSession: Send + Sync + fmt::Debug {
    /// Which backend implementation this is
    fn kind(&self) -> BackendKind;

    /// Identifier the session currently points at
    fn checkpoint_id(&self) -> &CheckpointId;

    /// Save/load id of the current session, `None` until the first reset
    fn session_id(&self) -> Option<Uuid>;

    /// Prepare the instance for a fresh checkpoint session at `checkpoint_id`
    fn reset(&mut self, checkpoint_id: &CheckpointId) -> Result<()>;
}

/// Loads items of an existing checkpoint
#[async_trait]
pub trait StorageReader: StorageSession {
    /// Read the checkpoint's global metadata, cached for the session
    async fn read_metadata(&self) -> Result<Bytes>;

    /// Read a single item by its key relative to the checkpoint root
    async fn read_item(&self, key: &str) -> Result<Bytes>;

    /// Keys of every item stored under the checkpoint
    async fn list_items(&self) -> Result<Vec<String>>;
}

/// Saves items of a new checkpoint
#[async_trait]
pub trait StorageWriter: StorageSession {
    /// Write a single item by its key relative to the checkpoint root
    async fn write_item(&self, key: &str, data: Bytes) -> Result<u64>;

    /// Write the checkpoint's global metadata
    async fn write_metadata(&self, data: Bytes) -> Result<u64>;

    /// Keys written during this session, sorted
    async fn finish(&self) -> Result<Vec<String>>;
}

/// Static half of the backend contract, used to build registry descriptors
pub trait CheckpointBackend: Sized {
    const KIND: BackendKind;

    /// Whether this backend can serve `checkpoint_id`
    ///
    /// Must not fail and must not modify anything; `false` means "not mine".
    fn validate_checkpoint_id(checkpoint_id: &CheckpointId) -> bool;

    /// Construct an instance for `checkpoint_id`
    fn open(checkpoint_id: &CheckpointId) -> Result<Self>;
}

/// Role a boxed handle type serves
pub trait HandleRole {
    const ROLE: StorageRole;
}

impl HandleRole for dyn StorageReader {
    const ROLE: StorageRole = StorageRole::Reader;
}

impl HandleRole for dyn StorageWriter {
    const ROLE: StorageRole = StorageRole::Writer;
}

/// Reject item keys that would escape the checkpoint root
pub(crate) fn check_item_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let escapes = key.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::Storage {
            message: format!("Invalid checkpoint item key {:?}", key),
        });
    }
    Ok(())
}
