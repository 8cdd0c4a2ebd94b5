//! Relational store bootstrap: pool construction and schema migration.
//!
//! The pipeline only ever touches the store through simple CRUD
//! statements; the schema below is the complete surface it owns.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Connect a pool against the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_pool_size)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;

    info!("Connected to database at {}", config.url);
    Ok(pool)
}

/// In-memory database with the schema applied. A single connection keeps
/// every caller on the same memory database.
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS monitoring_links (
            id              TEXT PRIMARY KEY,
            url             TEXT NOT NULL,
            customer_id     TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            decision_reason TEXT,
            created_at      TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            title      TEXT NOT NULL,
            message    TEXT NOT NULL,
            category   TEXT NOT NULL,
            read       INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, read)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_tokens (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            token        TEXT NOT NULL UNIQUE,
            device_type  TEXT NOT NULL,
            last_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_device_tokens_user ON device_tokens (user_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_preferences (
            user_id             TEXT PRIMARY KEY,
            email_monitoring    INTEGER NOT NULL DEFAULT 1,
            email_removal       INTEGER NOT NULL DEFAULT 1,
            email_status_change INTEGER NOT NULL DEFAULT 1,
            push_enabled        INTEGER NOT NULL DEFAULT 1,
            in_app_enabled      INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id     TEXT PRIMARY KEY,
            email  TEXT,
            locale TEXT NOT NULL DEFAULT 'en'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
