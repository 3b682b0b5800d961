//! Database access for vchk-iw
//!
//! SQLite via sqlx. Sessions, their photo steps, and signatures live in
//! three tables keyed by session id; every save is an upsert so retried
//! writes are idempotent.

pub mod sessions;
pub mod signatures;
pub mod steps;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the inspection workflow tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspection_sessions (
            session_id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            state TEXT NOT NULL,
            condition TEXT,
            fuel_level INTEGER,
            odometer_km INTEGER,
            notes TEXT,
            latitude REAL,
            longitude REAL,
            address TEXT,
            cursor INTEGER NOT NULL DEFAULT 0,
            highest_reached INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            locked_at TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photo_steps (
            session_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            kind TEXT NOT NULL,
            required INTEGER NOT NULL,
            capture_token TEXT,
            local_asset TEXT,
            remote_url TEXT,
            ai_description TEXT,
            description_approved INTEGER NOT NULL DEFAULT 0,
            verdict TEXT,
            captured_at TEXT,
            PRIMARY KEY (session_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signatures (
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            data TEXT NOT NULL,
            signed_at TEXT NOT NULL,
            PRIMARY KEY (session_id, role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
