//! Storage backend resolution
//!
//! Picks, constructs and initialises exactly one backend for a checkpoint
//! identifier, unless the caller already supplied a handle.

use runtime_core::{Error, Result};
use tracing::{debug, info, instrument};

use crate::id::CheckpointId;
use crate::registry::BackendRegistry;
use crate::session::{HandleRole, StorageReader, StorageSession, StorageWriter};

impl<T> BackendRegistry<T>
where
    T: ?Sized + StorageSession + HandleRole + 'static,
{
    /// Resolve a storage handle against this registry's candidates
    ///
    /// An explicit handle is returned untouched. Otherwise the first
    /// candidate whose predicate accepts `checkpoint_id` is constructed and
    /// reset once. Construction and reset errors are returned as-is and no
    /// later candidate is tried.
    pub fn resolve(
        &self,
        explicit: Option<Box<T>>,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<Box<T>> {
        if let Some(handle) = explicit {
            return Ok(handle);
        }

        let checkpoint_id = checkpoint_id
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingCheckpointId { role: T::ROLE })?;

        let Some(candidate) = self.candidates().iter().find(|candidate| {
            let accepted = candidate.validate_checkpoint_id(checkpoint_id);
            debug!(backend = %candidate.kind(), accepted, "Probed storage backend");
            accepted
        }) else {
            return Err(Error::UnrecognizedCheckpointId {
                checkpoint_id: checkpoint_id.to_string(),
                role: T::ROLE,
            });
        };

        let mut handle = candidate.construct(checkpoint_id)?;
        handle.reset(checkpoint_id)?;

        info!(
            backend = %candidate.kind(),
            role = %T::ROLE,
            %checkpoint_id,
            "Resolved checkpoint storage"
        );
        Ok(handle)
    }
}

/// Resolve the reader for loading a checkpoint
///
/// Returns `storage_reader` unchanged when given; otherwise probes the
/// default reader backends for `checkpoint_id`.
#[instrument(skip(storage_reader), fields(role = "reader", explicit = storage_reader.is_some()))]
pub fn storage_setup_reader(
    storage_reader: Option<Box<dyn StorageReader>>,
    checkpoint_id: Option<&CheckpointId>,
) -> Result<Box<dyn StorageReader>> {
    if let Some(reader) = storage_reader {
        return Ok(reader);
    }
    BackendRegistry::readers().resolve(None, checkpoint_id)
}

/// Resolve the writer for saving a checkpoint
///
/// Returns `storage_writer` unchanged when given; otherwise probes the
/// default writer backends for `checkpoint_id`.
#[instrument(skip(storage_writer), fields(role = "writer", explicit = storage_writer.is_some()))]
pub fn storage_setup_writer(
    storage_writer: Option<Box<dyn StorageWriter>>,
    checkpoint_id: Option<&CheckpointId>,
) -> Result<Box<dyn StorageWriter>> {
    if let Some(writer) = storage_writer {
        return Ok(writer);
    }
    BackendRegistry::writers().resolve(None, checkpoint_id)
}
