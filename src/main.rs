//! OCR Server
//!
//! Accepts image uploads from authenticated users, extracts their text and
//! keeps the results in SQLite with the images in S3-compatible storage.

use anyhow::Context;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_server::db::{self, UserRepository};
use ocr_server::{routes, storage, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting OCR Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        provider = ?config.storage.provider,
        endpoint = %config.storage.endpoint,
        bucket = %config.storage.bucket,
        "Object storage"
    );
    tracing::info!(
        provider = ?config.ocr.provider,
        language = %config.ocr.language,
        max_engines = config.ocr.max_engines,
        timeout_secs = config.ocr.timeout_secs,
        "OCR engine"
    );

    let object_store = storage::connect(&config.storage)
        .await
        .context("Failed to initialize object storage")?;

    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    let users = UserRepository::new(&db_pool).count().await?;
    tracing::info!("Database initialized at {} ({} users)", config.database.url, users);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let app_state = AppState::new(config, db_pool, object_store);
    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("OCR Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
