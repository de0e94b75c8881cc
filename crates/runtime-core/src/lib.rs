//! Runtime Core - Foundation for checkpoint storage
//!
//! Provides the shared error taxonomy, storage configuration, and
//! tracing setup used by the storage and checkpoint crates.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{LocalSettings, RetryConfig, S3Settings, StorageConfig};
pub use error::{Error, Result};
pub use types::*;
