//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::ocr::OcrProvider;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
    ocr: OcrHealth,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrHealth {
    provider: OcrProvider,
    available: bool,
    idle_engines: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(state.db()).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            "unavailable"
        }
    };

    let engines = state.ocr().engines();
    let provider = engines.provider();

    Json(HealthResponse {
        status: if database == "connected" { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        ocr: OcrHealth {
            provider: provider.provider_type(),
            available: provider.is_available().await,
            idle_engines: engines.idle_slots(),
        },
    })
}
