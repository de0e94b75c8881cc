//! Storage configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Environment variable names read by [`StorageConfig::from_env`]
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_AWS_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
pub const ENV_FORCE_PATH_STYLE: &str = "CKPT_S3_FORCE_PATH_STYLE";
pub const ENV_FSYNC: &str = "CKPT_FSYNC";

/// Storage settings shared by every checkpoint backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local filesystem settings
    pub local: LocalSettings,

    /// S3-compatible object store settings
    pub s3: S3Settings,

    /// Retry configuration for remote media
    pub retry: RetryConfig,
}

impl StorageConfig {
    /// Build a config from defaults overlaid with process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(region) = lookup(ENV_AWS_REGION).or_else(|| lookup(ENV_AWS_DEFAULT_REGION)) {
            config.s3.region = region;
        }
        if let Some(endpoint) = lookup(ENV_AWS_ENDPOINT_URL).filter(|s| !s.is_empty()) {
            config.s3.endpoint_url = Some(endpoint);
        }
        if let Some(value) = lookup(ENV_FORCE_PATH_STYLE) {
            config.s3.force_path_style = parse_flag(ENV_FORCE_PATH_STYLE, &value)?;
        }
        config.local = LocalSettings::from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values no backend can work with
    pub fn validate(&self) -> Result<()> {
        if self.s3.region.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "s3 region must not be empty".to_string(),
            });
        }
        self.retry.validate()
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig {
            message: format!("{} must be a boolean, got {:?}", key, other),
        }),
    }
}

/// Local filesystem settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// fsync files before the atomic rename
    pub sync_files: bool,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self { sync_files: true }
    }
}

impl LocalSettings {
    /// Local settings overlaid with process environment variables
    ///
    /// Only reads the local keys, so object store settings never affect it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(value) = lookup(ENV_FSYNC) {
            settings.sync_files = parse_flag(ENV_FSYNC, &value)?;
        }
        Ok(settings)
    }
}

/// S3-compatible object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// AWS region
    pub region: String,

    /// Optional custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,

    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_retries: u32,

    /// Initial delay before first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig {
                message: "retry.max_retries must be at least 1".to_string(),
            });
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(Error::InvalidConfig {
                message: format!(
                    "retry.backoff_multiplier must be >= 1.0, got {}",
                    self.backoff_multiplier
                ),
            });
        }
        Ok(())
    }
}

/// Duration serialization helper for human-readable formats
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.s3.region, "us-east-1");
        assert!(config.local.sync_files);
        assert_eq!(config.retry.max_retries, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let config = StorageConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StorageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.retry.initial_delay, config.retry.initial_delay);
        assert_eq!(parsed.s3.region, config.s3.region);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: StorageConfig =
            serde_json::from_str(r#"{"s3": {"endpoint_url": "http://localhost:9000"}}"#).unwrap();
        assert_eq!(parsed.s3.region, "us-east-1");
        assert_eq!(parsed.s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(parsed.local.sync_files);
    }

    #[test]
    fn test_env_overlay() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            (ENV_AWS_DEFAULT_REGION, "eu-west-1"),
            (ENV_AWS_ENDPOINT_URL, "http://minio:9000"),
            (ENV_FORCE_PATH_STYLE, "true"),
            (ENV_FSYNC, "0"),
        ]))
        .unwrap();

        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(config.s3.endpoint_url.as_deref(), Some("http://minio:9000"));
        assert!(config.s3.force_path_style);
        assert!(!config.local.sync_files);
    }

    #[test]
    fn test_region_prefers_aws_region() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            (ENV_AWS_REGION, "ap-south-1"),
            (ENV_AWS_DEFAULT_REGION, "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.s3.region, "ap-south-1");
    }

    #[test]
    fn test_env_rejects_bad_flag() {
        let result = StorageConfig::from_lookup(lookup_from(&[(ENV_FSYNC, "maybe")]));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_empty_region_is_invalid() {
        let result = StorageConfig::from_lookup(lookup_from(&[(ENV_AWS_REGION, " ")]));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_retry_delay_backoff_is_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(retry.delay_for_attempt(8), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_delay_for_huge_attempt_stays_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(u32::MAX), retry.max_delay);
        assert_eq!(retry.delay_for_attempt(i32::MAX as u32 + 1), retry.max_delay);
    }

    #[test]
    fn test_local_settings_ignore_object_store_keys() {
        let lookup = lookup_from(&[
            (ENV_AWS_REGION, ""),
            (ENV_FORCE_PATH_STYLE, "sometimes"),
            (ENV_FSYNC, "off"),
        ]);
        assert!(StorageConfig::from_lookup(&lookup).is_err());

        let local = LocalSettings::from_lookup(&lookup).unwrap();
        assert!(!local.sync_files);
    }

    #[test]
    fn test_retry_validation() {
        let retry = RetryConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(retry.validate().is_err());

        let retry = RetryConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(retry.validate().is_err());
    }
}
