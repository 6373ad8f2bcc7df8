//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::TokenService;
use crate::config::Config;
use crate::ocr::{provider_from_config, OcrProviderTrait, OcrService, OcrServiceConfig};
use crate::storage::ObjectStore;
use crate::upload::UploadPolicy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    tokens: TokenService,
    ocr: OcrService,
}

impl AppState {
    /// Create a new application state with the OCR provider named in the config
    pub fn new(config: Config, db: SqlitePool, storage: Arc<dyn ObjectStore>) -> Self {
        let provider = provider_from_config(&config.ocr);
        Self::with_provider(config, db, storage, provider)
    }

    /// Create a new application state around a specific OCR provider
    pub fn with_provider(
        config: Config,
        db: SqlitePool,
        storage: Arc<dyn ObjectStore>,
        provider: Arc<dyn OcrProviderTrait>,
    ) -> Self {
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);
        let ocr = OcrService::new(
            db.clone(),
            storage,
            provider,
            UploadPolicy::from_config(&config.upload),
            OcrServiceConfig::from_config(&config),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                tokens,
                ocr,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the token service
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// Get the OCR service
    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }
}
