//! OCR Module
//!
//! Turns uploaded images into recorded results.
//!
//! Supports multiple backends:
//! - Tesseract (local, requires installation)
//! - Ollama vision models (local LLM)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_server::ocr::{provider_from_config, OcrService, OcrServiceConfig};
//!
//! let service = OcrService::new(
//!     pool,
//!     storage,
//!     provider_from_config(&config.ocr),
//!     UploadPolicy::from_config(&config.upload),
//!     OcrServiceConfig::from_config(&config),
//! );
//!
//! let result = service.process_image(&user, upload).await?;
//! ```

mod engine;
mod provider;
mod service;
mod types;

pub use engine::{EngineLease, EnginePool};
pub use provider::{
    from_config as provider_from_config, OcrEngine, OcrProviderTrait, OllamaProvider, TesseractProvider,
};
pub use service::{storage_key, OcrResultView, OcrService, OcrServiceConfig, ProcessingFailure};
pub use types::{OcrError, OcrProvider, Recognition};
