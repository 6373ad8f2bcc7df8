//! Upload types for single-image OCR submissions

use axum::body::Bytes;

// ============================================================================
// Constants
// ============================================================================

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// Slack on top of the file limit for multipart boundaries and headers
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Fallback name when the client sends none
pub const DEFAULT_FILE_NAME: &str = "upload";

// ============================================================================
// Upload Types
// ============================================================================

/// An image received from a client, not yet validated
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Original file name as sent by the client
    pub file_name: String,

    /// Declared MIME type, if any
    pub content_type: Option<String>,

    /// Raw file bytes
    pub data: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// An upload that passed every precondition
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub file_name: String,

    /// Resolved MIME type (declared or guessed from the file name)
    pub mime_type: String,

    pub data: Bytes,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file uploaded. Use the 'image' field")]
    MissingFile,

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Invalid file type: {received}. Allowed types: {allowed}")]
    InvalidFileType { received: String, allowed: String },

    #[error("File too large: {size} bytes. Maximum size: {}MB", .max / 1024 / 1024)]
    FileTooLarge { size: u64, max: u64 },

    /// The request body hit the transport limit before the file was read
    #[error("File too large. Maximum size: {}MB", .max / 1024 / 1024)]
    PayloadTooLarge { max: u64 },

    #[error("Upload error: {0}")]
    Malformed(String),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        // Every upload rejection is a client error reported before any side effect
        axum::http::StatusCode::BAD_REQUEST
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "MISSING_FILE",
            Self::EmptyFile => "EMPTY_FILE",
            Self::InvalidFileType { .. } => "INVALID_FILE_TYPE",
            Self::FileTooLarge { .. } | Self::PayloadTooLarge { .. } => "FILE_TOO_LARGE",
            Self::Malformed(_) => "MALFORMED_UPLOAD",
        }
    }
}
