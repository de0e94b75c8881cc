use std::path::Path;

use anyhow::Result;
use bytes::Bytes;
use checkpoint::{
    storage_setup_reader, storage_setup_writer, BackendKind, BackendRegistry, CheckpointId,
    StorageReader, StorageSession, StorageWriter, METADATA_FILE,
};
use storage::{LocalStorage, StorageBackend};

fn raw_id(path: &Path) -> CheckpointId {
    CheckpointId::from(path.to_string_lossy().to_string())
}

async fn save_two_ranks(writer: &dyn StorageWriter) -> Result<Vec<String>> {
    writer
        .write_item("__0_0.distcp", Bytes::from(vec![0u8; 64]))
        .await?;
    writer
        .write_item("__1_0.distcp", Bytes::from(vec![1u8; 64]))
        .await?;
    writer.write_metadata(Bytes::from("global-plan")).await?;
    Ok(writer.finish().await?)
}

#[tokio::test]
async fn test_resolved_writer_and_reader_share_a_checkpoint() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let id = raw_id(&temp_dir.path().join("step-1000"));

    let writer = storage_setup_writer(None, Some(&id))?;
    let written = save_two_ranks(&*writer).await?;
    assert_eq!(written, vec![METADATA_FILE, "__0_0.distcp", "__1_0.distcp"]);

    let reader = storage_setup_reader(None, Some(&id))?;
    assert_eq!(reader.kind(), BackendKind::FileSystem);
    assert_eq!(reader.read_metadata().await?, Bytes::from("global-plan"));
    assert_eq!(reader.read_item("__1_0.distcp").await?, Bytes::from(vec![1u8; 64]));
    assert_eq!(reader.list_items().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_items_land_on_the_local_medium() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path().join("ckpt");

    let writer = storage_setup_writer(None, Some(&CheckpointId::from(dir.clone())))?;
    save_two_ranks(&*writer).await?;

    let medium = LocalStorage::new(&dir);
    assert_eq!(medium.read(METADATA_FILE).await?, Bytes::from("global-plan"));
    assert_eq!(medium.read("__0_0.distcp").await?.len(), 64);
    Ok(())
}

#[tokio::test]
async fn test_new_session_gets_new_save_id() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let id = raw_id(&temp_dir.path().join("ckpt"));

    let mut writer = storage_setup_writer(None, Some(&id))?;
    save_two_ranks(&*writer).await?;
    let first = writer.session_id();

    writer.reset(&id)?;
    assert_ne!(writer.session_id(), first);
    assert!(writer.finish().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_file_url_round_trip_when_remote_is_available() -> Result<()> {
    if !BackendRegistry::writers()
        .kinds()
        .contains(&BackendKind::Remote)
    {
        return Ok(());
    }

    let temp_dir = tempfile::tempdir()?;
    let url = CheckpointId::from(format!("file://{}/ckpt", temp_dir.path().display()));

    let writer = storage_setup_writer(None, Some(&url))?;
    assert_eq!(writer.kind(), BackendKind::Remote);
    save_two_ranks(&*writer).await?;

    let reader = storage_setup_reader(None, Some(&url))?;
    assert_eq!(reader.kind(), BackendKind::Remote);
    assert_eq!(reader.read_metadata().await?, Bytes::from("global-plan"));

    // The same directory is reachable as a plain path through the default backend.
    let local = storage_setup_reader(None, Some(&raw_id(&temp_dir.path().join("ckpt"))))?;
    assert_eq!(local.kind(), BackendKind::FileSystem);
    assert_eq!(local.read_item("__0_0.distcp").await?, Bytes::from(vec![0u8; 64]));
    Ok(())
}
