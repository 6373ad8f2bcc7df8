//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Registered users
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    -- Stored lowercased; NOCASE guards rows written by other tools
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per processing attempt
CREATE TABLE IF NOT EXISTS ocr_results (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    original_image TEXT NOT NULL,
    extracted_text TEXT NOT NULL DEFAULT '',
    processing_time INTEGER NOT NULL CHECK (processing_time >= 0),
    status TEXT NOT NULL CHECK (status IN ('success', 'failed')),
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ocr_results_user_created ON ocr_results(user_id, created_at DESC);
"#;
