//! S3 storage medium
//!
//! Provides async S3-compatible storage with:
//! - Multipart uploads for large files
//! - Exponential backoff retry logic
//! - Custom endpoint support (for MinIO, LocalStack, etc.)

use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_sdk_s3::{
    config::{BehaviorVersion, Builder as S3ConfigBuilder, Region},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;
use runtime_core::{Error, Result, RetryConfig, S3Settings};
use tracing::{debug, instrument, warn};

use crate::StorageBackend;

/// Threshold for switching to multipart upload (5 MB)
const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Part size for multipart uploads (5 MB minimum required by S3)
const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// S3-compatible storage medium
///
/// Supports Amazon S3 and S3-compatible services like MinIO.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    retry: RetryConfig,
}

/// Configuration for S3Storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Optional prefix for all paths (e.g., "run-42/step-1000")
    pub prefix: Option<String>,
    /// Region, endpoint and addressing style
    pub settings: S3Settings,
    /// Backoff policy for transient failures
    pub retry: RetryConfig,
}

impl S3Config {
    /// Config for a bucket with default settings
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            settings: S3Settings::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl S3Storage {
    /// Create a new S3Storage
    ///
    /// Credentials come from the standard AWS environment variables. Client
    /// construction performs no network I/O, so this is usable from
    /// synchronous code.
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::InvalidConfig {
                message: "s3 bucket name must not be empty".to_string(),
            });
        }
        config.retry.validate()?;

        let mut builder = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.settings.region.clone()))
            .credentials_provider(EnvironmentVariableCredentialsProvider::new());

        if let Some(endpoint) = &config.settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        if config.settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix.unwrap_or_default(),
            retry: config.retry,
        })
    }

    /// Bucket this storage writes into
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix applied to every path
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the full S3 key for a path
    fn s3_key(&self, path: &str) -> String {
        join_key(&self.prefix, path)
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.retry.max_retries;
        let mut last_error = None;

        for attempt in 0..max_retries {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Storage {
            message: format!("{} failed after {} retries", operation, max_retries),
        }))
    }

    /// Perform multipart upload for large files
    async fn multipart_upload(&self, key: &str, data: Bytes) -> Result<u64> {
        let size = data.len() as u64;

        // Initiate multipart upload
        let create_result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to initiate multipart upload: {}", e),
            })?;

        let upload_id = create_result.upload_id().ok_or_else(|| Error::Storage {
            message: "No upload_id returned".to_string(),
        })?;

        debug!(key, upload_id, size, "Started multipart upload");

        let mut completed_parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1;

        while offset < data.len() {
            let end = std::cmp::min(offset + MULTIPART_PART_SIZE, data.len());
            let part_data = data.slice(offset..end);

            let upload_part_result = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part_data.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    // Attempt to abort the upload on failure
                    self.abort_multipart_upload(key, upload_id);
                    Error::Storage {
                        message: format!("Failed to upload part {}: {}", part_number, e),
                    }
                })?;

            let etag = upload_part_result.e_tag().map(String::from);
            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(etag)
                    .build(),
            );

            debug!(part_number, offset, end, "Uploaded part");
            offset = end;
            part_number += 1;
        }

        // Complete multipart upload
        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to complete multipart upload: {}", e),
            })?;

        debug!(key, size, "Completed multipart upload");
        Ok(size)
    }

    /// Abort a multipart upload (best effort, for cleanup)
    fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let upload_id = upload_id.to_string();

        tokio::spawn(async move {
            let _ = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await;
        });
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.s3_key(path);
        debug!(%key, "Reading from S3");

        self.with_retry("read", || async {
            let result = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    if e.to_string().contains("NoSuchKey") {
                        Error::StoragePathNotFound {
                            path: path.to_string(),
                        }
                    } else {
                        Error::Storage {
                            message: format!("S3 get_object failed: {}", e),
                        }
                    }
                })?;

            let bytes = result.body.collect().await.map_err(|e| Error::Storage {
                message: format!("Failed to read S3 response body: {}", e),
            })?;

            Ok(Bytes::from(bytes.to_vec()))
        })
        .await
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket, size = data.len()))]
    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let key = self.s3_key(path);
        let size = data.len();
        debug!(%key, size, "Writing to S3");

        if size > MULTIPART_THRESHOLD {
            return self.multipart_upload(&key, data).await;
        }

        self.with_retry("write", || {
            let data = data.clone();
            let key = key.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(ByteStream::from(data.to_vec()))
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object failed: {}", e),
                    })?;

                Ok(size as u64)
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let s3_prefix = self.s3_key(prefix);
        debug!(%s3_prefix, "Listing S3 objects");

        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&s3_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("S3 list_objects failed: {}", e),
            })?;

            results.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(|key| relative_key(&self.prefix, key)),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        results.sort();
        debug!(count = results.len(), "Found S3 objects");
        Ok(results)
    }
}

/// Join a key prefix and a relative path with exactly one separator
fn join_key(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Strip the key prefix so listings match what callers passed to `write`
fn relative_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return key.to_string();
    }
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_key_with_prefix() {
        let prefix = "training/";
        assert_eq!(join_key(prefix, "model.bin"), "training/model.bin");
        assert_eq!(
            join_key(prefix, "shards/__0_0.distcp"),
            "training/shards/__0_0.distcp"
        );
    }

    #[test]
    fn test_s3_key_without_prefix() {
        assert_eq!(join_key("", ".metadata"), ".metadata");
        assert_eq!(join_key("/", ".metadata"), ".metadata");
    }

    #[test]
    fn test_s3_key_trailing_slash_normalization() {
        assert_eq!(join_key("data/", "file.bin"), "data/file.bin");
        assert_eq!(join_key("data", "file.bin"), "data/file.bin");
    }

    #[test]
    fn test_relative_key() {
        assert_eq!(relative_key("run-7", "run-7/.metadata"), ".metadata");
        assert_eq!(relative_key("run-7/", "run-7/shards/a.bin"), "shards/a.bin");
        assert_eq!(relative_key("", "shards/a.bin"), "shards/a.bin");
        assert_eq!(relative_key("run-7", "run-70/x"), "run-70/x");
    }

    #[test]
    fn test_s3_config_default() {
        let config = S3Config::new("my-bucket");
        assert_eq!(config.bucket, "my-bucket");
        assert!(config.prefix.is_none());
        assert!(config.settings.endpoint_url.is_none());
        assert_eq!(config.settings.region, "us-east-1");
        assert!(!config.settings.force_path_style);
    }

    #[test]
    fn test_new_rejects_empty_bucket() {
        let result = S3Storage::new(S3Config::new(""));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_new_builds_client_without_network() {
        let mut config = S3Config::new("ckpt-bucket");
        config.prefix = Some("run-7/".to_string());
        config.settings.endpoint_url = Some("http://localhost:9000".to_string());
        config.settings.force_path_style = true;

        let storage = S3Storage::new(config).unwrap();
        assert_eq!(storage.bucket(), "ckpt-bucket");
        assert_eq!(storage.s3_key(".metadata"), "run-7/.metadata");
        assert_eq!(storage.name(), "s3");
    }
}
