//! Storage types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Metadata about a storage object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// A storage object with its data
#[derive(Debug)]
pub struct StorageObject {
    pub metadata: ObjectMetadata,
    pub data: Vec<u8>,
}

/// Key-addressed blob storage used for uploaded images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key`, replacing anything already there
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Fetch an object's data
    async fn get_object(&self, key: &str) -> StorageResult<StorageObject>;

    /// Remove an object
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Produce a temporary URL granting read access to `key`
    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}
