//! Object store backed by S3 or an S3-compatible service (MinIO, R2, B2)
//!
//! Uploaded images are stored under their generated key; reads hand out
//! presigned GET URLs instead of proxying bytes.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use chrono::DateTime;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::types::{ObjectMetadata, ObjectStore, StorageObject, StorageResult};

/// Image bucket client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Build the client and check the bucket once
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "ocr-server",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // MinIO and friends need path-style addressing
            .build();

        let client = Client::from_conf(s3_config);

        // A missing bucket is not fatal; uploads will surface the error
        let bucket = config.bucket.clone();
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            tracing::warn!(
                bucket = %bucket,
                error = %DisplayErrorContext(&e),
                "Image bucket not reachable at startup"
            );
        } else {
            tracing::info!(bucket = %bucket, "Image bucket ready");
        }

        Ok(Self { client, bucket })
    }

    /// Bucket holding the uploaded images
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Map an SDK failure onto the storage error taxonomy
fn classify(action: &str, key: &str, detail: String) -> StorageError {
    if detail.contains("NoSuchBucket") {
        StorageError::BucketNotFound(detail)
    } else if detail.contains("404") || detail.contains("NoSuchKey") || detail.contains("NotFound") {
        StorageError::ObjectNotFound(key.to_string())
    } else if detail.contains("403") || detail.contains("AccessDenied") {
        StorageError::AccessDenied(format!("{} {}", action, key))
    } else if detail.contains("dispatch failure")
        || detail.contains("timed out")
        || detail.contains("connection")
    {
        StorageError::ConnectionFailed(format!("Failed to {} {}: {}", action, key, detail))
    } else {
        StorageError::SdkError(format!("Failed to {} {}: {}", action, key, detail))
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("put object", key, DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<StorageObject> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("get object", key, DisplayErrorContext(&e).to_string()))?;

        let metadata = ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0),
            last_modified: response.last_modified().and_then(|dt| {
                DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
            }),
            content_type: response.content_type().map(|s| s.to_string()),
            etag: response.e_tag().map(|s| s.to_string()),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("Failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(StorageObject { metadata, data })
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("delete object", key, DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::SdkError(format!("Invalid presigning config: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| classify("sign url for", key, DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify("get object", "a.png", "service error: NoSuchKey".to_string());
        assert!(matches!(err, StorageError::ObjectNotFound(key) if key == "a.png"));
    }

    #[test]
    fn test_classify_dispatch_failure_is_connection() {
        let err = classify("put object", "a.png", "dispatch failure: io error".to_string());
        assert!(matches!(err, StorageError::ConnectionFailed(_)));
    }

    #[test]
    fn test_classify_access_denied() {
        let err = classify("delete object", "a.png", "AccessDenied: nope".to_string());
        assert!(matches!(err, StorageError::AccessDenied(_)));
    }
}
