//! OCR Service
//!
//! Runs the upload pipeline: validate, store, recognize, record. Every
//! accepted upload produces exactly one result row, whether or not text could
//! be extracted. Reads and deletes check that the caller owns the result.

use rand_core::{OsRng, RngCore};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::{NewOcrResult, OcrResult, OcrResultRepository};
use crate::error::{AppError, Result, StorageError};
use crate::retry::RetryPolicy;
use crate::storage::ObjectStore;
use crate::upload::{ImageUpload, UploadPolicy, ValidatedImage, DEFAULT_FILE_NAME};

use super::engine::{EngineLease, EnginePool};
use super::provider::OcrProviderTrait;
use super::types::OcrError;

/// Longest file name kept in a storage key
const MAX_KEY_NAME_LEN: usize = 100;

/// Why text could not be extracted; recorded on the result row
#[derive(Debug, thiserror::Error)]
pub enum ProcessingFailure {
    #[error("Error accessing image storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to extract text from image: {0}")]
    Recognition(#[from] OcrError),

    #[error("OCR processing timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
}

/// A result as returned to its owner, with a fresh image link
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResultView {
    #[serde(flatten)]
    pub result: OcrResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// OCR service settings
#[derive(Debug, Clone)]
pub struct OcrServiceConfig {
    pub language: String,
    /// Ceiling for store + recognize
    pub timeout: Duration,
    pub max_engines: usize,
    pub signed_url_ttl: Duration,
    pub retry: RetryPolicy,
}

impl OcrServiceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            language: config.ocr.language.clone(),
            timeout: Duration::from_secs(config.ocr.timeout_secs.max(1)),
            max_engines: config.ocr.max_engines,
            signed_url_ttl: Duration::from_secs(config.storage.signed_url_ttl_secs),
            retry: RetryPolicy::default().with_max_attempts(config.ocr.retry_attempts),
        }
    }
}

#[derive(Clone)]
pub struct OcrService {
    db: SqlitePool,
    storage: Arc<dyn ObjectStore>,
    engines: EnginePool,
    uploads: UploadPolicy,
    config: OcrServiceConfig,
}

impl OcrService {
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn ObjectStore>,
        provider: Arc<dyn OcrProviderTrait>,
        uploads: UploadPolicy,
        config: OcrServiceConfig,
    ) -> Self {
        let engines = EnginePool::new(provider, config.max_engines, config.retry.clone());
        Self {
            db,
            storage,
            engines,
            uploads,
            config,
        }
    }

    pub fn engines(&self) -> &EnginePool {
        &self.engines
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.uploads
    }

    /// Validate, store and recognize one image, recording the outcome
    pub async fn process_image(&self, user: &AuthUser, upload: ImageUpload) -> Result<OcrResultView> {
        let image = self.uploads.validate(upload)?;

        // Detached so a dropped request still gets its row and releases its engine
        let service = self.clone();
        let user_id = user.id.clone();
        let run = tokio::spawn(async move { service.run_pipeline(&user_id, image).await });
        let result = run
            .await
            .map_err(|e| AppError::Internal(format!("OCR task failed: {}", e)))??;

        Ok(self.view(result).await)
    }

    /// Store, recognize and record an already validated image
    async fn run_pipeline(&self, user_id: &str, image: ValidatedImage) -> Result<OcrResult> {
        let started = Instant::now();
        let key = storage_key(&image.file_name);

        // The lease lives outside the timed future so it is released even on timeout
        let mut lease = None;
        let outcome = match tokio::time::timeout(
            self.config.timeout,
            self.extract_text(&key, &image, &mut lease),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ProcessingFailure::TimedOut(self.config.timeout)),
        };
        if let Some(lease) = lease.take() {
            lease.release().await;
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let record = match outcome {
            Ok(text) => NewOcrResult::success(user_id, &key, text, elapsed_ms),
            Err(failure) => {
                warn!(
                    user_id = %user_id,
                    key = %key,
                    error = %failure,
                    "OCR processing failed"
                );
                NewOcrResult::failed(user_id, &key, failure.to_string(), elapsed_ms)
            }
        };

        let result = OcrResultRepository::new(&self.db).create(&record).await?;
        info!(
            result_id = %result.id,
            user_id = %user_id,
            status = result.status.as_str(),
            processing_ms = result.processing_time,
            "OCR result recorded"
        );

        Ok(result)
    }

    async fn extract_text(
        &self,
        key: &str,
        image: &ValidatedImage,
        slot: &mut Option<EngineLease>,
    ) -> std::result::Result<String, ProcessingFailure> {
        let storage = self.storage.as_ref();
        let mime_type = image.mime_type.as_str();
        self.config
            .retry
            .run("put_object", move || {
                storage.put_object(key, image.data.to_vec(), mime_type)
            })
            .await?;

        let lease: &EngineLease = slot.insert(self.engines.acquire().await?);

        let language = self.config.language.as_str();
        let data = image.data.as_ref();
        let recognition = self
            .config
            .retry
            .run("recognize", move || lease.recognize(data, language))
            .await?;

        Ok(recognition.text)
    }

    /// All of a user's results, newest first
    pub async fn list_for_user(&self, user: &AuthUser) -> Result<Vec<OcrResultView>> {
        let results = OcrResultRepository::new(&self.db)
            .list_for_user(&user.id)
            .await?;

        let mut views = Vec::with_capacity(results.len());
        for result in results {
            views.push(self.view(result).await);
        }
        Ok(views)
    }

    /// Number of results the caller has
    pub async fn count_for_user(&self, user: &AuthUser) -> Result<i64> {
        OcrResultRepository::new(&self.db).count_for_user(&user.id).await
    }

    /// One result, if the caller owns it
    pub async fn get_for_user(&self, user: &AuthUser, id: &str) -> Result<OcrResultView> {
        let result = self.owned_result(user, id).await?;
        Ok(self.view(result).await)
    }

    /// Delete a result and, best effort, its stored image
    pub async fn delete_for_user(&self, user: &AuthUser, id: &str) -> Result<()> {
        let result = self.owned_result(user, id).await?;

        if let Err(e) = self.storage.delete_object(&result.original_image).await {
            warn!(
                result_id = %result.id,
                key = %result.original_image,
                error = %e,
                "Failed to delete stored image; removing the record anyway"
            );
        }

        OcrResultRepository::new(&self.db).delete(&result.id).await?;
        info!(result_id = %result.id, user_id = %user.id, "OCR result deleted");
        Ok(())
    }

    async fn owned_result(&self, user: &AuthUser, id: &str) -> Result<OcrResult> {
        let result = OcrResultRepository::new(&self.db)
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("OCR result not found".to_string()))?;

        if result.user_id != user.id {
            warn!(result_id = %id, user_id = %user.id, "Access to another user's result refused");
            return Err(AppError::Forbidden(
                "Not authorized to access this result".to_string(),
            ));
        }
        Ok(result)
    }

    async fn view(&self, result: OcrResult) -> OcrResultView {
        let image_url = match self
            .storage
            .presigned_url(&result.original_image, self.config.signed_url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(result_id = %result.id, error = %e, "Failed to sign image URL");
                None
            }
        };

        OcrResultView { result, image_url }
    }
}

/// `{unix millis}-{random}-{file name}`, with the name reduced to safe characters
pub fn storage_key(file_name: &str) -> String {
    let mut name: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_KEY_NAME_LEN)
        .collect();
    if name.trim_matches(['.', '_']).is_empty() {
        name = DEFAULT_FILE_NAME.to_string();
    }

    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        OsRng.next_u32() % 1_000_000_000,
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, ProcessingStatus};
    use crate::ocr::{OcrEngine, OcrProvider, Recognition};
    use crate::storage::{MemoryStore, StorageObject, StorageResult};
    use crate::upload::{jpeg_bytes, png_bytes};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the stub engine does when asked to recognize
    #[derive(Clone)]
    enum Behavior {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct StubProvider {
        behavior: Behavior,
        spawned: AtomicUsize,
        terminated: Arc<AtomicUsize>,
        /// Bytes handed to the most recent engine
        seen: Arc<Mutex<Option<Vec<u8>>>>,
    }

    impl StubProvider {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                spawned: AtomicUsize::new(0),
                terminated: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(None)),
            })
        }
    }

    struct StubEngine {
        behavior: Behavior,
        terminated: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<Vec<u8>>>>,
    }

    #[async_trait]
    impl OcrEngine for StubEngine {
        async fn recognize(&self, image_data: &[u8], _language: &str) -> std::result::Result<Recognition, OcrError> {
            *self.seen.lock() = Some(image_data.to_vec());
            match self.behavior {
                Behavior::Text(text) => Ok(Recognition {
                    text: text.to_string(),
                    provider: OcrProvider::Tesseract,
                }),
                Behavior::Fail => Err(OcrError::ProcessingError("unreadable image".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }

        async fn terminate(&mut self) -> std::result::Result<(), OcrError> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl OcrProviderTrait for StubProvider {
        fn provider_type(&self) -> OcrProvider {
            OcrProvider::Tesseract
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn spawn_engine(&self) -> std::result::Result<Box<dyn OcrEngine>, OcrError> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubEngine {
                behavior: self.behavior.clone(),
                terminated: Arc::clone(&self.terminated),
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    /// Store whose writes and deletes always fail
    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn put_object(&self, _key: &str, _data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
            Err(StorageError::AccessDenied("read-only bucket".to_string()))
        }

        async fn get_object(&self, key: &str) -> StorageResult<StorageObject> {
            Err(StorageError::ObjectNotFound(key.to_string()))
        }

        async fn delete_object(&self, _key: &str) -> StorageResult<()> {
            Err(StorageError::AccessDenied("read-only bucket".to_string()))
        }

        async fn presigned_url(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
            Err(StorageError::AccessDenied("read-only bucket".to_string()))
        }
    }

    fn test_config() -> OcrServiceConfig {
        OcrServiceConfig {
            language: "eng".to_string(),
            timeout: Duration::from_secs(5),
            max_engines: 2,
            signed_url_ttl: Duration::from_secs(3600),
            retry: RetryPolicy {
                base_delay_ms: 1,
                max_delay_ms: 1,
                ..RetryPolicy::default()
            },
        }
    }

    async fn service_with(
        storage: Arc<dyn ObjectStore>,
        provider: Arc<StubProvider>,
        config: OcrServiceConfig,
    ) -> OcrService {
        let defaults = Config::default();
        OcrService::new(
            memory_pool().await,
            storage,
            provider,
            UploadPolicy::from_config(&defaults.upload),
            config,
        )
    }

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
        }
    }

    fn jpeg_upload() -> ImageUpload {
        ImageUpload::new("scan.jpg", Some("image/jpeg".to_string()), jpeg_bytes(2048))
    }

    #[tokio::test]
    async fn test_successful_upload_records_text() {
        let store = MemoryStore::new("test-bucket");
        let provider = StubProvider::new(Behavior::Text("Hello World"));
        let service = service_with(Arc::new(store.clone()), provider.clone(), test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();

        assert_eq!(view.result.user_id, "u1");
        assert_eq!(view.result.status, ProcessingStatus::Success);
        assert_eq!(view.result.extracted_text, "Hello World");
        assert!(view.result.error.is_none());
        assert!(view.result.original_image.ends_with("-scan.jpg"));
        assert!(store.contains(&view.result.original_image));
        assert!(view.image_url.is_some());
        assert_eq!(provider.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(provider.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_reads_the_stored_bytes() {
        let store = MemoryStore::new("test-bucket");
        let provider = StubProvider::new(Behavior::Text("Hello World"));
        let service = service_with(Arc::new(store.clone()), provider.clone(), test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();

        let stored = store.get_object(&view.result.original_image).await.unwrap();
        let seen = provider.seen.lock().clone().unwrap();
        assert_eq!(seen, jpeg_bytes(2048));
        assert_eq!(seen, stored.data);
        assert_eq!(stored.metadata.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_recognition_failure_becomes_failed_row() {
        let provider = StubProvider::new(Behavior::Fail);
        let service = service_with(Arc::new(MemoryStore::default()), provider.clone(), test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();

        assert_eq!(view.result.status, ProcessingStatus::Failed);
        assert_eq!(view.result.extracted_text, "");
        assert!(view.result.error.unwrap().contains("unreadable image"));
        assert_eq!(provider.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_failed_row() {
        let provider = StubProvider::new(Behavior::Text("never seen"));
        let service = service_with(Arc::new(BrokenStore), provider.clone(), test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();

        assert_eq!(view.result.status, ProcessingStatus::Failed);
        assert!(view.result.error.unwrap().contains("image storage"));
        assert!(!view.result.original_image.is_empty());
        assert!(view.image_url.is_none());
        // Recognition never started
        assert_eq!(provider.spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_records_failure_and_releases_engine() {
        let provider = StubProvider::new(Behavior::Hang);
        let config = OcrServiceConfig {
            timeout: Duration::from_millis(100),
            max_engines: 1,
            ..test_config()
        };
        let service = service_with(Arc::new(MemoryStore::default()), provider.clone(), config).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();

        assert_eq!(view.result.status, ProcessingStatus::Failed);
        assert!(view.result.error.unwrap().contains("timed out"));
        assert_eq!(provider.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(service.engines().idle_slots(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_records_and_releases() {
        let provider = StubProvider::new(Behavior::Hang);
        let config = OcrServiceConfig {
            timeout: Duration::from_millis(300),
            max_engines: 1,
            ..test_config()
        };
        let service = service_with(Arc::new(MemoryStore::default()), provider.clone(), config).await;

        // The caller gives up long before the pipeline deadline
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            service.process_image(&user("u1"), jpeg_upload()),
        )
        .await;
        assert!(abandoned.is_err());

        let mut results = Vec::new();
        for _ in 0..50 {
            results = service.list_for_user(&user("u1")).await.unwrap();
            if !results.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result.status, ProcessingStatus::Failed);
        assert!(results[0].result.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(provider.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(service.engines().idle_slots(), 1);
    }

    #[tokio::test]
    async fn test_rejected_upload_writes_nothing() {
        let store = MemoryStore::default();
        let provider = StubProvider::new(Behavior::Text("x"));
        let service = service_with(Arc::new(store.clone()), provider.clone(), test_config()).await;

        let upload = ImageUpload::new("notes.txt", Some("text/plain".to_string()), b"hello".to_vec());
        let err = service.process_image(&user("u1"), upload).await.unwrap_err();

        assert!(matches!(err, AppError::Upload(_)));
        assert!(store.is_empty());
        assert!(service.list_for_user(&user("u1")).await.unwrap().is_empty());
        assert_eq!(provider.spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listing_is_per_user_and_newest_first() {
        let provider = StubProvider::new(Behavior::Text("t"));
        let service = service_with(Arc::new(MemoryStore::default()), provider, test_config()).await;

        let first = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();
        let png = ImageUpload::new("shot.png", Some("image/png".to_string()), png_bytes(512));
        let second = service.process_image(&user("u1"), png).await.unwrap();
        service.process_image(&user("u2"), jpeg_upload()).await.unwrap();

        let listed = service.list_for_user(&user("u1")).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|v| v.result.id.clone()).collect();
        assert_eq!(ids, vec![second.result.id, first.result.id]);
    }

    #[tokio::test]
    async fn test_ownership_is_enforced() {
        let provider = StubProvider::new(Behavior::Text("t"));
        let service = service_with(Arc::new(MemoryStore::default()), provider, test_config()).await;

        let view = service.process_image(&user("owner"), jpeg_upload()).await.unwrap();
        let id = view.result.id.as_str();

        assert!(matches!(
            service.get_for_user(&user("intruder"), id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_for_user(&user("intruder"), id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(service.get_for_user(&user("owner"), id).await.is_ok());
        assert!(matches!(
            service.get_for_user(&user("owner"), "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_object() {
        let store = MemoryStore::default();
        let provider = StubProvider::new(Behavior::Text("t"));
        let service = service_with(Arc::new(store.clone()), provider, test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();
        service.delete_for_user(&user("u1"), &view.result.id).await.unwrap();

        assert!(!store.contains(&view.result.original_image));
        assert!(matches!(
            service.get_for_user(&user("u1"), &view.result.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_survives_object_store_failure() {
        let provider = StubProvider::new(Behavior::Text("t"));
        let service = service_with(Arc::new(BrokenStore), provider, test_config()).await;

        let view = service.process_image(&user("u1"), jpeg_upload()).await.unwrap();
        service.delete_for_user(&user("u1"), &view.result.id).await.unwrap();

        assert!(service.list_for_user(&user("u1")).await.unwrap().is_empty());
    }

    #[test]
    fn test_storage_key_shape() {
        let key = storage_key("../../etc/My Scan (1).PNG");
        let mut parts = key.splitn(3, '-');
        assert!(parts.next().unwrap().parse::<i64>().is_ok());
        assert!(parts.next().unwrap().parse::<u32>().is_ok());
        assert_eq!(parts.next().unwrap(), "My_Scan__1_.PNG");

        assert!(storage_key("").ends_with("-upload"));
        assert!(storage_key("...").ends_with("-upload"));
        assert_ne!(storage_key("a.png"), storage_key("a.png"));
    }

    #[test]
    fn test_view_serializes_flat() {
        let view = OcrResultView {
            result: OcrResult {
                id: "r1".into(),
                user_id: "u1".into(),
                original_image: "k".into(),
                extracted_text: "t".into(),
                processing_time: 3,
                status: ProcessingStatus::Success,
                error: None,
                created_at: "c".into(),
                updated_at: "u".into(),
            },
            image_url: Some("memory://b/k".into()),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "r1");
        assert_eq!(json["imageUrl"], "memory://b/k");
        assert_eq!(json["originalImage"], "k");
    }
}
