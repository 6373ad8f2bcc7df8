//! OCR result database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::now_timestamp;

/// Outcome of a processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<String> for ProcessingStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown processing status: {}", value)),
        }
    }
}

/// OCR result record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub id: String,
    pub user_id: String,
    /// Object storage key of the uploaded image
    pub original_image: String,
    pub extracted_text: String,
    /// Milliseconds from upload start to outcome
    pub processing_time: i64,
    #[sqlx(try_from = "String")]
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A result about to be written
///
/// Only constructible through [`NewOcrResult::success`] and
/// [`NewOcrResult::failed`], which keep status, text and error consistent.
#[derive(Debug, Clone)]
pub struct NewOcrResult {
    user_id: String,
    original_image: String,
    extracted_text: String,
    processing_time: i64,
    status: ProcessingStatus,
    error: Option<String>,
}

impl NewOcrResult {
    pub fn success(
        user_id: impl Into<String>,
        original_image: impl Into<String>,
        extracted_text: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            original_image: original_image.into(),
            extracted_text: extracted_text.into(),
            processing_time: clamp_millis(processing_time_ms),
            status: ProcessingStatus::Success,
            error: None,
        }
    }

    pub fn failed(
        user_id: impl Into<String>,
        original_image: impl Into<String>,
        error: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "Failed to extract text from image".to_string()
        } else {
            error
        };

        Self {
            user_id: user_id.into(),
            original_image: original_image.into(),
            extracted_text: String::new(),
            processing_time: clamp_millis(processing_time_ms),
            status: ProcessingStatus::Failed,
            error: Some(error),
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }
}

fn clamp_millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// OCR result repository
pub struct OcrResultRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OcrResultRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific result
    pub async fn get(&self, id: &str) -> Result<Option<OcrResult>> {
        let result = sqlx::query_as::<_, OcrResult>(
            r#"
            SELECT id, user_id, original_image, extracted_text, processing_time,
                   status, error, created_at, updated_at
            FROM ocr_results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(result)
    }

    /// List a user's results, most recent first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<OcrResult>> {
        let results = sqlx::query_as::<_, OcrResult>(
            r#"
            SELECT id, user_id, original_image, extracted_text, processing_time,
                   status, error, created_at, updated_at
            FROM ocr_results
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(results)
    }

    /// Create a new result
    pub async fn create(&self, data: &NewOcrResult) -> Result<OcrResult> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO ocr_results (id, user_id, original_image, extracted_text, processing_time, status, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&data.user_id)
        .bind(&data.original_image)
        .bind(&data.extracted_text)
        .bind(data.processing_time)
        .bind(data.status.as_str())
        .bind(&data.error)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created OCR result".to_string()))
    }

    /// Delete a result; a missing id is an error
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM ocr_results WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("OCR result not found: {}", id)));
        }
        Ok(())
    }

    /// Count results for a user
    pub async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ocr_results WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }
}
