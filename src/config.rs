//! Configuration management for OCR Server

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Default upload ceiling: 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Seconds an engine gets to shut down after a run
pub const ENGINE_RELEASE_MARGIN_SECS: u64 = 5;

/// Image types accepted when `ALLOWED_FILE_TYPES` is unset
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub upload: UploadConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin; any origin when unset
    pub cors_origin: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Lifetime of image URLs handed to clients
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
    /// In-process store for local development
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub provider: OcrProviderKind,
    pub language: String,
    pub ollama_url: String,
    pub ollama_model: String,
    /// Ceiling for a whole upload-to-result run
    pub timeout_secs: u64,
    pub max_engines: usize,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProviderKind {
    Tesseract,
    Ollama,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                cors_origin: None,
                request_timeout_secs: 600,
            },
            storage: StorageConfig {
                provider: StorageProvider::Memory,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "ocr-images".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                signed_url_ttl_secs: 3600,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            auth: AuthConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                token_ttl_hours: 24,
            },
            upload: UploadConfig {
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
            },
            ocr: OcrConfig {
                provider: OcrProviderKind::Tesseract,
                language: "eng".to_string(),
                ollama_url: "http://localhost:11434".to_string(),
                ollama_model: "llava".to_string(),
                timeout_secs: 300,
                max_engines: 2,
                retry_attempts: 3,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let storage_provider = parse_storage_provider(
            &env::var("S3_PROVIDER").unwrap_or_else(|_| "minio".to_string()),
        )?;

        // Remote providers cannot run without credentials
        let storage_var = |key: &'static str, fallback: &str| -> Result<String, ConfigError> {
            match env::var(key) {
                Ok(value) => Ok(value),
                Err(_) if storage_provider == StorageProvider::Memory => Ok(fallback.to_string()),
                Err(_) => Err(ConfigError::Missing(key)),
            }
        };

        let ocr_provider = parse_ocr_provider(
            &env::var("OCR_PROVIDER").unwrap_or_else(|_| "tesseract".to_string()),
        )?;

        let allowed_types = env::var("ALLOWED_FILE_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or(defaults.upload.allowed_types);

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                value: "<empty>".to_string(),
            });
        }

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
                cors_origin: env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
                request_timeout_secs: parse_var(
                    "REQUEST_TIMEOUT_SECS",
                    defaults.server.request_timeout_secs,
                )?,
            },
            storage: StorageConfig {
                provider: storage_provider,
                endpoint: storage_var("S3_ENDPOINT", &defaults.storage.endpoint)?,
                bucket: storage_var("S3_BUCKET", &defaults.storage.bucket)?,
                access_key: storage_var("S3_ACCESS_KEY", &defaults.storage.access_key)?,
                secret_key: storage_var("S3_SECRET_KEY", &defaults.storage.secret_key)?,
                region: env::var("S3_REGION").ok(),
                signed_url_ttl_secs: parse_var(
                    "SIGNED_URL_TTL_SECS",
                    defaults.storage.signed_url_ttl_secs,
                )?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./ocr.db".to_string()),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            auth: AuthConfig {
                jwt_secret,
                token_ttl_hours: parse_var("JWT_EXPIRY_HOURS", defaults.auth.token_ttl_hours)?,
            },
            upload: UploadConfig {
                max_file_size: parse_var("MAX_FILE_SIZE", defaults.upload.max_file_size)?,
                allowed_types,
            },
            ocr: OcrConfig {
                provider: ocr_provider,
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.ocr.ollama_url),
                ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ocr.ollama_model),
                timeout_secs: parse_var("OCR_TIMEOUT_SECS", defaults.ocr.timeout_secs)?,
                max_engines: parse_var("OCR_MAX_ENGINES", defaults.ocr.max_engines)?,
                retry_attempts: parse_var("OCR_RETRY_ATTEMPTS", defaults.ocr.retry_attempts)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks. The request deadline must outlast the OCR run plus
    /// engine shutdown, or the handler is dropped before the run is recorded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = self
            .ocr
            .timeout_secs
            .saturating_add(ENGINE_RELEASE_MARGIN_SECS);
        if self.server.request_timeout_secs <= required {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                value: format!(
                    "{} (must exceed OCR_TIMEOUT_SECS + {} = {})",
                    self.server.request_timeout_secs, ENGINE_RELEASE_MARGIN_SECS, required
                ),
            });
        }
        Ok(())
    }
}

fn parse_storage_provider(raw: &str) -> Result<StorageProvider, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "minio" => Ok(StorageProvider::Minio),
        "r2" => Ok(StorageProvider::R2),
        "s3" => Ok(StorageProvider::S3),
        "b2" => Ok(StorageProvider::B2),
        "memory" => Ok(StorageProvider::Memory),
        _ => Err(ConfigError::Invalid {
            key: "S3_PROVIDER",
            value: raw.to_string(),
        }),
    }
}

fn parse_ocr_provider(raw: &str) -> Result<OcrProviderKind, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "tesseract" => Ok(OcrProviderKind::Tesseract),
        "ollama" => Ok(OcrProviderKind::Ollama),
        _ => Err(ConfigError::Invalid {
            key: "OCR_PROVIDER",
            value: raw.to_string(),
        }),
    }
}

/// Parse an optional variable, keeping the default when it is unset
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_local_setup() {
        let config = Config::default();
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert!(config.upload.allowed_types.contains(&"image/jpg".to_string()));
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        std::env::set_var("OCR_SERVER_TEST_PORT", "not-a-port");
        let result: Result<u16, _> = parse_var("OCR_SERVER_TEST_PORT", 80);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        std::env::remove_var("OCR_SERVER_TEST_PORT");
    }

    #[test]
    fn test_unknown_providers_are_rejected() {
        assert_eq!(parse_storage_provider("R2").unwrap(), StorageProvider::R2);
        assert_eq!(parse_storage_provider("minio").unwrap(), StorageProvider::Minio);
        assert!(matches!(
            parse_storage_provider("minoi"),
            Err(ConfigError::Invalid { key: "S3_PROVIDER", .. })
        ));

        assert_eq!(parse_ocr_provider(" Ollama ").unwrap(), OcrProviderKind::Ollama);
        assert!(matches!(
            parse_ocr_provider("paddle"),
            Err(ConfigError::Invalid { key: "OCR_PROVIDER", .. })
        ));
    }

    #[test]
    fn test_request_timeout_must_outlast_ocr_run() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.server.request_timeout_secs = config.ocr.timeout_secs + ENGINE_RELEASE_MARGIN_SECS;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "REQUEST_TIMEOUT_SECS", .. })
        ));

        config.server.request_timeout_secs += 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: u64 = parse_var("OCR_SERVER_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
