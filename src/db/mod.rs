//! Database module for SQLite persistence
//!
//! Handles user accounts and OCR result storage.

mod ocr_results;
mod schema;
mod users;

pub use ocr_results::*;
pub use schema::*;
pub use users::*;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    // Every connection to an in-memory database sees its own empty database,
    // so those pools hold exactly one connection for their whole life.
    let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Current time as a fixed-width RFC 3339 string, so text order is time order
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    create_pool(&crate::config::Config::default().database)
        .await
        .expect("in-memory database")
}
