use std::path::Path;
use std::thread;

use anyhow::Result;
use checkpoint::{
    storage_setup_reader, storage_setup_writer, BackendDescriptor, BackendKind, BackendRegistry,
    CheckpointId, FileSystemReader, FileSystemWriter, StorageSession, StorageWriter,
};
use runtime_core::{Error, LocalSettings, StorageRole};

fn raw_id(path: &Path) -> CheckpointId {
    CheckpointId::from(path.to_string_lossy().to_string())
}

#[test]
fn test_local_path_writer_scenario() -> Result<()> {
    runtime_core::telemetry::init_tracing("checkpoint=debug");
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path().join("ckpt");
    let id = raw_id(&dir);

    let registry = BackendRegistry::new(vec![BackendDescriptor::writer::<FileSystemWriter>()]);
    assert_eq!(registry.kinds(), vec![BackendKind::FileSystem]);

    let writer = registry.resolve(None, Some(&id))?;
    assert_eq!(writer.kind(), BackendKind::FileSystem);
    assert_eq!(writer.checkpoint_id(), &id);
    assert!(writer.session_id().is_some());
    assert!(dir.is_dir());
    Ok(())
}

#[test]
fn test_no_handle_no_identifier() {
    let err = storage_setup_writer(None, None).unwrap_err();
    assert!(matches!(err, Error::MissingCheckpointId { role: StorageRole::Writer }));
    assert!(err.to_string().contains("must be specified"));

    let err = storage_setup_reader(None, None).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_unsupported_scheme() {
    let id = CheckpointId::from("mem://unsupported");

    let err = storage_setup_writer(None, Some(&id)).unwrap_err();
    assert!(err.is_resolution_error());
    assert!(err.to_string().contains("explicitly"));

    let err = storage_setup_reader(None, Some(&id)).unwrap_err();
    assert!(matches!(err, Error::UnrecognizedCheckpointId { role: StorageRole::Reader, .. }));
}

#[test]
fn test_explicit_writer_bypasses_resolution() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let explicit: Box<dyn StorageWriter> = Box::new(FileSystemWriter::new(
        temp_dir.path().join("explicit"),
        &LocalSettings::default(),
    )?);

    // The identifier is deliberately unusable; it must not be consulted.
    let writer = storage_setup_writer(Some(explicit), Some(&CheckpointId::from("mem://ignored")))?;
    assert_eq!(writer.kind(), BackendKind::FileSystem);
    assert!(writer.session_id().is_none());
    Ok(())
}

#[test]
fn test_local_path_prefers_filesystem_over_remote() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let id = raw_id(&temp_dir.path().join("ckpt"));

    let registry = BackendRegistry::writers();
    let accepting: Vec<BackendKind> = registry
        .candidates()
        .iter()
        .filter(|candidate| candidate.validate_checkpoint_id(&id))
        .map(|candidate| candidate.kind())
        .collect();
    if registry.kinds().contains(&BackendKind::Remote) {
        assert_eq!(accepting, vec![BackendKind::FileSystem, BackendKind::Remote]);
    } else {
        assert_eq!(accepting, vec![BackendKind::FileSystem]);
    }

    let writer = registry.resolve(None, Some(&id))?;
    assert_eq!(writer.kind(), BackendKind::FileSystem);
    Ok(())
}

#[test]
fn test_reader_for_missing_directory_fails_fast() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let id = raw_id(&temp_dir.path().join("never-written"));

    let err = storage_setup_reader(None, Some(&id)).unwrap_err();
    assert!(matches!(err, Error::StoragePathNotFound { .. }));
    Ok(())
}

#[test]
fn test_typed_path_reader() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let registry = BackendRegistry::new(vec![BackendDescriptor::reader::<FileSystemReader>()]);

    let reader = registry.resolve(None, Some(&CheckpointId::from(temp_dir.path())))?;
    assert_eq!(reader.kind(), BackendKind::FileSystem);
    assert!(reader.session_id().is_some());
    Ok(())
}

#[test]
fn test_concurrent_resolutions_are_independent() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|rank| {
            let dir = root.join(format!("rank-{rank}"));
            thread::spawn(move || {
                let id = raw_id(&dir);
                storage_setup_writer(None, Some(&id)).map(|w| (w.kind(), w.session_id()))
            })
        })
        .collect();

    let mut session_ids = Vec::new();
    for handle in handles {
        let (kind, session_id) = handle.join().expect("resolver thread panicked")?;
        assert_eq!(kind, BackendKind::FileSystem);
        session_ids.push(session_id.expect("session id after reset"));
    }

    session_ids.sort();
    session_ids.dedup();
    assert_eq!(session_ids.len(), 8);
    Ok(())
}
