//! Ordered candidate backends for each storage role
//!
//! A registry is rebuilt for every resolution. Mandatory backends come
//! first; optional backends are appended only when their loader succeeds,
//! so a default backend always wins when several accept an identifier.

use std::fmt;

use runtime_core::Result;
use tracing::debug;

use crate::filesystem::{FileSystemReader, FileSystemWriter};
use crate::id::CheckpointId;
use crate::session::{BackendKind, CheckpointBackend, StorageReader, StorageWriter};

type Probe = Box<dyn Fn(&CheckpointId) -> bool + Send + Sync>;
type Factory<T> = Box<dyn Fn(&CheckpointId) -> Result<Box<T>> + Send + Sync>;

/// One candidate backend for a role: its tag, predicate and constructor
pub struct BackendDescriptor<T: ?Sized> {
    kind: BackendKind,
    validate: Probe,
    construct: Factory<T>,
}

impl<T: ?Sized + 'static> BackendDescriptor<T> {
    pub fn new<V, C>(kind: BackendKind, validate: V, construct: C) -> Self
    where
        V: Fn(&CheckpointId) -> bool + Send + Sync + 'static,
        C: Fn(&CheckpointId) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            kind,
            validate: Box::new(validate),
            construct: Box::new(construct),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn validate_checkpoint_id(&self, checkpoint_id: &CheckpointId) -> bool {
        (self.validate)(checkpoint_id)
    }

    pub fn construct(&self, checkpoint_id: &CheckpointId) -> Result<Box<T>> {
        (self.construct)(checkpoint_id)
    }
}

impl BackendDescriptor<dyn StorageReader> {
    /// Descriptor for a reader type implementing [`CheckpointBackend`]
    pub fn reader<B>() -> Self
    where
        B: CheckpointBackend + StorageReader + 'static,
    {
        Self::new(B::KIND, B::validate_checkpoint_id, |checkpoint_id| {
            Ok(Box::new(B::open(checkpoint_id)?) as Box<dyn StorageReader>)
        })
    }
}

impl BackendDescriptor<dyn StorageWriter> {
    /// Descriptor for a writer type implementing [`CheckpointBackend`]
    pub fn writer<B>() -> Self
    where
        B: CheckpointBackend + StorageWriter + 'static,
    {
        Self::new(B::KIND, B::validate_checkpoint_id, |checkpoint_id| {
            Ok(Box::new(B::open(checkpoint_id)?) as Box<dyn StorageWriter>)
        })
    }
}

impl<T: ?Sized> fmt::Debug for BackendDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Priority-ordered candidates for one role
pub struct BackendRegistry<T: ?Sized> {
    candidates: Vec<BackendDescriptor<T>>,
}

impl<T: ?Sized> fmt::Debug for BackendRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.candidates).finish()
    }
}

impl<T: ?Sized + 'static> BackendRegistry<T> {
    /// Start a registry from the backends that are always available
    pub fn new(mandatory: Vec<BackendDescriptor<T>>) -> Self {
        Self {
            candidates: mandatory,
        }
    }

    /// Append an optional backend if `loader` can provide it
    ///
    /// A failing loader only means the backend is unavailable in this
    /// process; the error is dropped and the candidate omitted.
    pub fn with_optional<F>(mut self, loader: F) -> Self
    where
        F: FnOnce() -> Result<BackendDescriptor<T>>,
    {
        match loader() {
            Ok(descriptor) => self.candidates.push(descriptor),
            Err(e) => debug!(error = %e, "Optional storage backend unavailable; skipping"),
        }
        self
    }

    pub fn candidates(&self) -> &[BackendDescriptor<T>] {
        &self.candidates
    }

    /// Backend tags in probe order
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.candidates.iter().map(|c| c.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl BackendRegistry<dyn StorageReader> {
    /// Default reader candidates: filesystem, then remote when available
    pub fn readers() -> Self {
        Self::new(vec![BackendDescriptor::reader::<FileSystemReader>()])
            .with_optional(optional::remote_reader)
    }
}

impl BackendRegistry<dyn StorageWriter> {
    /// Default writer candidates: filesystem, then remote when available
    pub fn writers() -> Self {
        Self::new(vec![BackendDescriptor::writer::<FileSystemWriter>()])
            .with_optional(optional::remote_writer)
    }
}

/// Loaders for backends compiled in behind cargo features
mod optional {
    use super::*;

    #[cfg(feature = "remote")]
    pub(super) fn remote_reader() -> Result<BackendDescriptor<dyn StorageReader>> {
        Ok(BackendDescriptor::reader::<crate::remote::RemoteReader>())
    }

    #[cfg(feature = "remote")]
    pub(super) fn remote_writer() -> Result<BackendDescriptor<dyn StorageWriter>> {
        Ok(BackendDescriptor::writer::<crate::remote::RemoteWriter>())
    }

    #[cfg(not(feature = "remote"))]
    pub(super) fn remote_reader() -> Result<BackendDescriptor<dyn StorageReader>> {
        Err(unavailable())
    }

    #[cfg(not(feature = "remote"))]
    pub(super) fn remote_writer() -> Result<BackendDescriptor<dyn StorageWriter>> {
        Err(unavailable())
    }

    #[cfg(not(feature = "remote"))]
    fn unavailable() -> runtime_core::Error {
        runtime_core::Error::StorageUnavailable {
            backend: "remote (built without the `remote` feature)".to_string(),
        }
    }
}
