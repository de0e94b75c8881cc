//! Runs in its own test binary because it mutates the process environment.

use anyhow::Result;
use checkpoint::{
    storage_setup_reader, storage_setup_writer, BackendKind, BackendRegistry, CheckpointId,
    StorageSession,
};
use runtime_core::StorageConfig;

#[test]
fn test_local_paths_resolve_with_broken_object_store_env() -> Result<()> {
    std::env::set_var("AWS_REGION", "");
    std::env::set_var("CKPT_S3_FORCE_PATH_STYLE", "sometimes");
    assert!(StorageConfig::from_env().is_err());

    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path().join("ckpt");
    let id = CheckpointId::from(dir.to_string_lossy().to_string());

    let writer = storage_setup_writer(None, Some(&id))?;
    assert_eq!(writer.kind(), BackendKind::FileSystem);
    assert!(dir.is_dir());

    let reader = storage_setup_reader(None, Some(&id))?;
    assert_eq!(reader.kind(), BackendKind::FileSystem);

    if BackendRegistry::writers()
        .kinds()
        .contains(&BackendKind::Remote)
    {
        let url = CheckpointId::from(format!("file://{}", dir.display()));
        let writer = storage_setup_writer(None, Some(&url))?;
        assert_eq!(writer.kind(), BackendKind::Remote);
    }
    Ok(())
}
