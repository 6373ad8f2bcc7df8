//! OCR API endpoints
//!
//! - POST   /api/ocr/process       multipart upload, field `image`
//! - GET    /api/ocr/results       total in `x-total-count`
//! - GET    /api/ocr/results/:id
//! - DELETE /api/ocr/results/:id

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{HeaderName, StatusCode},
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::ocr::OcrResultView;
use crate::state::AppState;
use crate::upload::{ImageUpload, UploadError, DEFAULT_FILE_NAME, IMAGE_FIELD, MULTIPART_OVERHEAD};

use super::auth::MessageResponse;

static TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

/// Create the OCR router; the body limit follows the configured file limit
pub fn router(state: &AppState) -> Router<AppState> {
    let max_file_size = state.ocr().upload_policy().max_file_size();
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(
            "/process",
            post(process_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/results", get(list_results))
        .route("/results/:id", get(get_result).delete(delete_result))
}

async fn process_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResultView>> {
    let max_file_size = state.ocr().upload_policy().max_file_size();
    let mut multipart = multipart.map_err(|e| UploadError::Malformed(e.body_text()))?;

    let upload = read_image_field(&mut multipart, max_file_size).await?;
    tracing::debug!(
        user_id = %user.id,
        file_name = %upload.file_name,
        content_type = ?upload.content_type,
        size = upload.size(),
        "Received image upload"
    );

    let view = state.ocr().process_image(&user, upload).await?;
    Ok(Json(view))
}

/// Pull the `image` field out of the form, skipping anything else
async fn read_image_field(
    multipart: &mut Multipart,
    max_file_size: u64,
) -> std::result::Result<ImageUpload, UploadError> {
    let to_upload_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::PayloadTooLarge { max: max_file_size }
        } else {
            UploadError::Malformed(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(to_upload_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(to_upload_error)?;

        return Ok(ImageUpload::new(file_name, content_type, data));
    }

    Err(UploadError::MissingFile)
}

async fn list_results(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<([(HeaderName, String); 1], Json<Vec<OcrResultView>>)> {
    let results = state.ocr().list_for_user(&user).await?;
    let total = state.ocr().count_for_user(&user).await?;
    tracing::debug!(user_id = %user.id, count = results.len(), total, "Listed OCR results");
    Ok(([(TOTAL_COUNT.clone(), total.to_string())], Json(results)))
}

async fn get_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<OcrResultView>> {
    Ok(Json(state.ocr().get_for_user(&user, &id).await?))
}

async fn delete_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.ocr().delete_for_user(&user, &id).await?;
    Ok(Json(MessageResponse {
        message: "OCR result deleted successfully".to_string(),
    }))
}
