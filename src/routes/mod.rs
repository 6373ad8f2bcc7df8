//! HTTP routes
//!
//! Everything lives under `/api`, with a service index at `/` and health
//! checks at `/health` and `/api/health`.

pub mod auth;
pub mod health;
pub mod ocr;

use axum::{
    http::{HeaderValue, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config().server.cors_origin.as_deref());
    let timeout = Duration::from_secs(state.config().server.request_timeout_secs.max(1));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth::router())
        .nest("/api/ocr", ocr::router(&state))
        .fallback(not_found)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid CORS origin ({}); allowing any origin", e);
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

/// Endpoint groups shown by the index and the 404 handler
fn endpoints() -> serde_json::Value {
    json!({
        "auth": {
            "register": "POST /api/auth/register",
            "login": "POST /api/auth/login",
            "logout": "POST /api/auth/logout",
            "me": "GET /api/auth/me"
        },
        "ocr": {
            "process": "POST /api/ocr/process",
            "results": "GET /api/ocr/results",
            "result": "GET /api/ocr/results/:id",
            "delete": "DELETE /api/ocr/results/:id"
        },
        "health": "GET /api/health"
    })
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "OCR Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints()
    }))
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": format!("Route {} {} not found", method, uri.path()),
            "availableEndpoints": endpoints()
        })),
    )
}
