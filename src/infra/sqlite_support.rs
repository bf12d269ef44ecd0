// Shared SQLite plumbing for the stores: opening the pool and the timestamp
// encoding every table uses.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Open (creating if needed) the SQLite database at `database_url`.
///
/// Accepts `sqlite://path`, `sqlite::memory:` or a bare file path.
pub async fn connect(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    if database_url.contains(":memory:") {
        // Each in-memory connection is its own database; keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        return Ok(pool);
    }

    let path_str = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path_str = path_str.split('?').next().unwrap_or(path_str);
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", path_str))
        .await?;
    Ok(pool)
}

/// Key/value table for site-wide settings documents, one JSON value per key.
pub async fn migrate_options(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS options (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_option<T: DeserializeOwned>(
    pool: &Pool<Sqlite>,
    name: &str,
) -> anyhow::Result<Option<T>> {
    let row = sqlx::query("SELECT value FROM options WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let raw: String = row.get("value");
            Ok(Some(serde_json::from_str(&raw)?))
        }
        None => Ok(None),
    }
}

pub async fn save_option<T: Serialize>(
    pool: &Pool<Sqlite>,
    name: &str,
    value: &T,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO options (name, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(serde_json::to_string(value)?)
    .bind(encode_ts(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

/// RFC 3339, UTC, fixed microsecond precision. Fixed width keeps string
/// order equal to time order, so the columns can be compared in SQL.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

pub fn decode_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    raw.as_deref().map(decode_ts).transpose()
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// A fresh database in a temporary directory. Keep the `TempDir` alive for as
/// long as the pool is used.
#[cfg(test)]
pub async fn test_pool() -> (tempfile::TempDir, Pool<Sqlite>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("moderation.db");
    let pool = connect(&path.to_string_lossy())
        .await
        .expect("open test database");
    (dir, pool)
}
