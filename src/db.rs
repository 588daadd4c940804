use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub type DB = SqlitePool;

/// Local database location: `<data dir>/ferro/ferro.db`, or the working
/// directory on platforms without a data dir.
pub fn default_path() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("ferro").join("ferro.db"),
        None => PathBuf::from("./ferro.db"),
    }
}

pub async fn open(path: &Path) -> Result<DB> {
    let pool = connect(path).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Pool over a sqlite file, created on first use. No schema is applied;
/// callers bootstrap their own.
pub async fn connect(path: &Path) -> Result<DB> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }

    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .with_context(|| format!("could not open database at {}", path.display()))
}

/// Idempotent schema bootstrap. Session and queue bodies are opaque JSON
/// blobs; only ordering and retry bookkeeping get their own columns.
pub async fn init_schema(pool: &DB) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS active_session (
            slot       INTEGER PRIMARY KEY CHECK (slot = 1),
            body       TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_queue (
            seq        INTEGER PRIMARY KEY AUTOINCREMENT,
            kind       TEXT NOT NULL,
            body       TEXT NOT NULL,
            retries    INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL UNIQUE,
            rest_secs  INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_exercises (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id      TEXT NOT NULL,
            position         INTEGER NOT NULL,
            name             TEXT NOT NULL,
            muscle           TEXT,
            modality         TEXT NOT NULL,
            sets             INTEGER NOT NULL,
            reps             TEXT NOT NULL,
            follows_previous INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
