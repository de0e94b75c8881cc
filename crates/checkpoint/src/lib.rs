//! Checkpoint storage backends and backend resolution
//!
//! Given a checkpoint identifier (a path or URL) and optionally a storage
//! handle the caller already built, pick the backend that can serve the
//! identifier, construct it and prepare it for a fresh session.
//!
//! # Example
//!
//! ```no_run
//! use checkpoint::{storage_setup_writer, BackendKind, CheckpointId, StorageSession};
//!
//! # fn example() -> runtime_core::Result<()> {
//! let id = CheckpointId::from("/tmp/ckpt");
//! let writer = storage_setup_writer(None, Some(&id))?;
//! assert_eq!(writer.kind(), BackendKind::FileSystem);
//! # Ok(())
//! # }
//! ```

pub mod filesystem;
pub mod id;
pub mod registry;
pub mod resolver;
pub mod session;

#[cfg(feature = "remote")]
pub mod remote;

pub use filesystem::{FileSystemReader, FileSystemWriter};
pub use id::CheckpointId;
pub use registry::{BackendDescriptor, BackendRegistry};
pub use resolver::{storage_setup_reader, storage_setup_writer};
pub use session::{
    BackendKind, CheckpointBackend, HandleRole, StorageReader, StorageSession, StorageWriter,
    METADATA_FILE,
};

#[cfg(feature = "remote")]
pub use remote::{RemoteLocation, RemoteReader, RemoteWriter};
