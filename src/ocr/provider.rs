//! OCR Providers
//!
//! A provider knows how to start recognition engines. Each engine serves a
//! single processing run and is terminated afterwards.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{OcrConfig, OcrProviderKind};

use super::types::{OcrError, OcrProvider, Recognition};

/// OCR provider trait
#[async_trait]
pub trait OcrProviderTrait: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> OcrProvider;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Start a fresh engine instance
    async fn spawn_engine(&self) -> Result<Box<dyn OcrEngine>, OcrError>;
}

/// A running recognition engine
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image
    async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Recognition, OcrError>;

    /// Shut the engine down; later calls to `recognize` fail
    async fn terminate(&mut self) -> Result<(), OcrError>;
}

/// Build the provider selected by configuration
pub fn from_config(config: &OcrConfig) -> Arc<dyn OcrProviderTrait> {
    match config.provider {
        OcrProviderKind::Tesseract => Arc::new(TesseractProvider::new()),
        OcrProviderKind::Ollama => Arc::new(OllamaProvider::new(&config.ollama_url, &config.ollama_model)),
    }
}

/// Tesseract OCR provider
pub struct TesseractProvider {
    binary: String,
}

impl TesseractProvider {
    pub fn new() -> Self {
        Self::with_binary("tesseract")
    }

    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

impl Default for TesseractProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrProviderTrait for TesseractProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn spawn_engine(&self) -> Result<Box<dyn OcrEngine>, OcrError> {
        if !self.is_available().await {
            return Err(OcrError::EngineStartFailed(format!(
                "'{}' is not installed or not on PATH",
                self.binary
            )));
        }

        Ok(Box::new(TesseractEngine {
            binary: self.binary.clone(),
            terminated: AtomicBool::new(false),
        }))
    }
}

/// One Tesseract run per `recognize` call, image piped through stdin
pub struct TesseractEngine {
    binary: String,
    terminated: AtomicBool,
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Recognition, OcrError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(OcrError::ProcessingError("engine already terminated".to_string()));
        }

        // The child is killed if this future is dropped mid-run
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", language, "--oem", "3", "--psm", "3"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to run tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image_data)
                .await
                .map_err(|e| OcrError::ProcessingError(format!("Failed to send image: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::ProcessingError(format!("Failed to read output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        Ok(Recognition {
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            provider: OcrProvider::Tesseract,
        })
    }

    async fn terminate(&mut self) -> Result<(), OcrError> {
        self.terminated.store(true, Ordering::Release);
        Ok(())
    }
}

/// Ollama vision model provider
pub struct OllamaProvider {
    /// Ollama API URL
    base_url: String,
    /// Model name (e.g., "llava", "bakllava")
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl OcrProviderTrait for OllamaProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Ollama
    }

    async fn is_available(&self) -> bool {
        let client = reqwest::Client::new();
        let url = format!("{}/api/tags", self.base_url);

        match client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn spawn_engine(&self) -> Result<Box<dyn OcrEngine>, OcrError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OcrError::EngineStartFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Box::new(OllamaEngine {
            client: Some(client),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }))
    }
}

/// An HTTP session against the Ollama generate endpoint
pub struct OllamaEngine {
    client: Option<reqwest::Client>,
    base_url: String,
    model: String,
}

#[async_trait]
impl OcrEngine for OllamaEngine {
    async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Recognition, OcrError> {
        use base64::Engine;

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| OcrError::ProcessingError("engine already terminated".to_string()))?;
        let url = format!("{}/api/generate", self.base_url);

        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let prompt = format!(
            "Extract all text from this image exactly as written. The text language code is {}. Return only the extracted text, nothing else.",
            language
        );

        let request = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false
        });

        let response = client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to call Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = format!("Ollama returned {}: {}", status, body);
            // 4xx means the request itself is wrong; retrying will not help
            return Err(if status.is_client_error() {
                OcrError::ProcessingError(error)
            } else {
                OcrError::ApiError(error)
            });
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to parse response: {}", e)))?;

        let text = result["response"].as_str().unwrap_or("").trim().to_string();

        Ok(Recognition {
            text,
            provider: OcrProvider::Ollama,
        })
    }

    async fn terminate(&mut self) -> Result<(), OcrError> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_unavailable() {
        let provider = TesseractProvider::with_binary("definitely-not-a-real-ocr-binary");
        assert!(!provider.is_available().await);

        match provider.spawn_engine().await {
            Err(e) => assert!(matches!(e, OcrError::EngineStartFailed(_))),
            Ok(_) => panic!("engine started without a binary"),
        }
    }

    #[tokio::test]
    async fn test_terminated_engine_refuses_work() {
        let mut engine = TesseractEngine {
            binary: "tesseract".to_string(),
            terminated: AtomicBool::new(false),
        };
        engine.terminate().await.unwrap();

        let err = engine.recognize(b"ignored", "eng").await.unwrap_err();
        assert!(matches!(err, OcrError::ProcessingError(_)));
    }

    #[tokio::test]
    async fn test_ollama_engine_after_terminate() {
        let provider = OllamaProvider::new("http://127.0.0.1:9/", "llava");
        let mut engine = provider.spawn_engine().await.unwrap();
        engine.terminate().await.unwrap();
        assert!(engine.recognize(b"ignored", "eng").await.is_err());
    }

    #[test]
    fn test_from_config_selects_provider() {
        let mut config = crate::config::Config::default().ocr;
        assert_eq!(from_config(&config).provider_type(), OcrProvider::Tesseract);

        config.provider = OcrProviderKind::Ollama;
        assert_eq!(from_config(&config).provider_type(), OcrProvider::Ollama);
    }
}
