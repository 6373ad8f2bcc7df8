//! Engine pool
//!
//! Caps how many engines run at once. Every lease owns a freshly spawned
//! engine that nobody else sees; releasing the lease terminates it and frees
//! the slot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::ENGINE_RELEASE_MARGIN_SECS;
use crate::retry::RetryPolicy;

use super::provider::{OcrEngine, OcrProviderTrait};
use super::types::{OcrError, OcrProvider, Recognition};

/// How long an engine gets to shut down before it is abandoned
const RELEASE_TIMEOUT: Duration = Duration::from_secs(ENGINE_RELEASE_MARGIN_SECS);

#[derive(Clone)]
pub struct EnginePool {
    provider: Arc<dyn OcrProviderTrait>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl EnginePool {
    pub fn new(provider: Arc<dyn OcrProviderTrait>, max_engines: usize, retry: RetryPolicy) -> Self {
        Self {
            provider,
            permits: Arc::new(Semaphore::new(max_engines.max(1))),
            retry,
        }
    }

    pub fn provider(&self) -> &Arc<dyn OcrProviderTrait> {
        &self.provider
    }

    /// Engines that could start right now without waiting
    pub fn idle_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot, then spawn an engine into it
    pub async fn acquire(&self) -> Result<EngineLease, OcrError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OcrError::ProviderNotAvailable("engine pool is closed".to_string()))?;

        let provider = self.provider.as_ref();
        let engine = self
            .retry
            .run("spawn_engine", move || provider.spawn_engine())
            .await?;

        debug!(provider = %provider.provider_type(), "OCR engine started");

        Ok(EngineLease {
            engine,
            provider: provider.provider_type(),
            _permit: permit,
        })
    }
}

/// Exclusive use of one engine
pub struct EngineLease {
    engine: Box<dyn OcrEngine>,
    provider: OcrProvider,
    _permit: OwnedSemaphorePermit,
}

impl EngineLease {
    pub async fn recognize(&self, image_data: &[u8], language: &str) -> Result<Recognition, OcrError> {
        self.engine.recognize(image_data, language).await
    }

    /// Terminate the engine; failures are logged, never returned
    pub async fn release(mut self) {
        match tokio::time::timeout(RELEASE_TIMEOUT, self.engine.terminate()).await {
            Ok(Ok(())) => debug!(provider = %self.provider, "OCR engine terminated"),
            Ok(Err(e)) => warn!(provider = %self.provider, error = %e, "OCR engine termination failed"),
            Err(_) => warn!(
                provider = %self.provider,
                timeout_secs = RELEASE_TIMEOUT.as_secs(),
                "OCR engine termination timed out"
            ),
        }
    }
}
