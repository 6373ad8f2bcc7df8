//! Upload validation
//!
//! Checks run in a fixed order so the client learns which constraint failed:
//! empty file, MIME type allow-list, size ceiling, then magic-byte sniffing.

use image::ImageFormat;

use crate::config::UploadConfig;

use super::types::{ImageUpload, UploadError, ValidatedImage, DEFAULT_FILE_NAME};

/// Type and size limits applied to every upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64, allowed_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_types: allowed_types.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_file_size, config.allowed_types.clone())
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn validate(&self, upload: ImageUpload) -> Result<ValidatedImage, UploadError> {
        if upload.data.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        let mime_type = resolve_mime_type(&upload);
        if !self.allowed_types.iter().any(|t| *t == mime_type) {
            tracing::debug!(
                received = %mime_type,
                allowed = ?self.allowed_types,
                "Rejected upload type"
            );
            return Err(self.invalid_type(mime_type));
        }

        if upload.size() > self.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: upload.size(),
                max: self.max_file_size,
            });
        }

        // The declared type must agree with the actual bytes
        if let Some(expected) = image_format_for(&mime_type) {
            match image::guess_format(&upload.data) {
                Ok(actual) if actual == expected => {}
                Ok(actual) => {
                    tracing::debug!(declared = %mime_type, actual = ?actual, "Upload content mismatch");
                    return Err(self.invalid_type(format!("{} (content is {:?})", mime_type, actual)));
                }
                Err(_) => {
                    return Err(self.invalid_type(format!("{} (unrecognized content)", mime_type)));
                }
            }
        }

        let file_name = if upload.file_name.trim().is_empty() {
            DEFAULT_FILE_NAME.to_string()
        } else {
            upload.file_name
        };

        Ok(ValidatedImage {
            file_name,
            mime_type,
            data: upload.data,
        })
    }

    fn invalid_type(&self, received: String) -> UploadError {
        UploadError::InvalidFileType {
            received,
            allowed: self.allowed_types.join(", "),
        }
    }
}

/// Declared content type without parameters, or a guess from the file name
fn resolve_mime_type(upload: &ImageUpload) -> String {
    upload
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| {
            mime_guess::from_path(&upload.file_name)
                .first()
                .map(|m| m.essence_str().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn image_format_for(mime_type: &str) -> Option<ImageFormat> {
    match mime_type {
        // Non-standard alias still sent by some browsers
        "image/jpg" => Some(ImageFormat::Jpeg),
        other => ImageFormat::from_mime_type(other),
    }
}
