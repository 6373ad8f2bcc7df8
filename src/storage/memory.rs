//! In-process object store
//!
//! Keeps objects in a map. Used for local development without MinIO and by
//! the test suite.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;

use super::types::{ObjectMetadata, ObjectStore, StorageObject, StorageResult};

#[derive(Clone)]
struct StoredBlob {
    metadata: ObjectMetadata,
    data: Vec<u8>,
}

/// Object store backed by a shared in-memory map
#[derive(Clone, Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::default(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let metadata = ObjectMetadata {
            key: key.to_string(),
            size: data.len() as i64,
            last_modified: Some(Utc::now()),
            content_type: Some(content_type.to_string()),
            etag: None,
        };
        self.objects
            .write()
            .insert(key.to_string(), StoredBlob { metadata, data });
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<StorageObject> {
        let objects = self.objects.read();
        let blob = objects
            .get(key)
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))?;
        Ok(StorageObject {
            metadata: blob.metadata.clone(),
            data: blob.data.clone(),
        })
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        // S3 semantics: deleting a missing key succeeds
        self.objects.write().remove(key);
        Ok(())
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let expires_at = Utc::now().timestamp() + expires_in.as_secs() as i64;
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            urlencoding::encode(key),
            expires_at
        ))
    }
}
