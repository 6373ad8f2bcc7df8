//! OCR Types
//!
//! Defines the recognition output and the errors engines report.

use serde::{Deserialize, Serialize};

use crate::retry::Transient;

/// OCR provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProvider {
    /// Tesseract OCR (local CLI)
    Tesseract,
    /// Ollama vision model (local LLM)
    Ollama,
}

impl Default for OcrProvider {
    fn default() -> Self {
        Self::Tesseract
    }
}

impl std::fmt::Display for OcrProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tesseract => write!(f, "tesseract"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Text recognized from one image
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    /// Recognized text, trimmed
    pub text: String,
    /// Provider used
    pub provider: OcrProvider,
}

/// OCR error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum OcrError {
    #[error("OCR provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Failed to start OCR engine: {0}")]
    EngineStartFailed(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl Transient for OcrError {
    fn is_transient(&self) -> bool {
        // Engine start-up and remote calls can fail on load; a bad image will not improve
        matches!(self, Self::EngineStartFailed(_) | Self::ApiError(_))
    }
}
