//! Storage module for S3-compatible backends
//!
//! Supports MinIO, Cloudflare R2, Backblaze B2, and AWS S3, plus an
//! in-memory store for local development.

mod memory;
mod s3_client;
mod types;

pub use memory::MemoryStore;
pub use s3_client::S3Client;
pub use types::*;

use std::sync::Arc;

use crate::config::{StorageConfig, StorageProvider};

/// Build the object store selected by configuration
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.provider {
        StorageProvider::Memory => {
            tracing::warn!("Using in-memory object storage; uploads are lost on restart");
            Ok(Arc::new(MemoryStore::new(config.bucket.clone())))
        }
        _ => {
            let client = S3Client::new(config).await?;
            tracing::info!(
                provider = ?config.provider,
                bucket = client.bucket(),
                "Object storage ready"
            );
            Ok(Arc::new(client))
        }
    }
}
