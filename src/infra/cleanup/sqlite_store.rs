use crate::core::cleanup::{
    CleanupError, CleanupLog, CleanupLogFilter, CleanupSettings, CleanupStatus, CleanupStore,
    NewCleanupLog, LOCK_TTL_SECS,
};
use crate::infra::sqlite_support::{
    decode_opt_ts, decode_ts, encode_ts, load_option, migrate_options, save_option,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

const SETTINGS_OPTION: &str = "cleanup_settings";

pub struct SqliteCleanupStore {
    pool: Pool<Sqlite>,
}

impl SqliteCleanupStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        migrate_options(&self.pool).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cleanup_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cleanup_type TEXT NOT NULL,
                triggered_by INTEGER,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL,
                threshold_days INTEGER NOT NULL,
                articles_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_articles TEXT NOT NULL DEFAULT '[]',
                error_message TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS advisory_locks (
                name TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn storage(e: impl std::fmt::Display) -> CleanupError {
    CleanupError::StorageError(e.to_string())
}

fn row_to_log(row: &SqliteRow) -> Result<CleanupLog, CleanupError> {
    let cleanup_type: String = row.get("cleanup_type");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let deleted: String = row.get("deleted_articles");
    Ok(CleanupLog {
        id: row.get("id"),
        cleanup_type: cleanup_type.parse().map_err(storage)?,
        triggered_by: row.get("triggered_by"),
        started_at: decode_ts(&started_at).map_err(storage)?,
        completed_at: decode_opt_ts(row.get("completed_at")).map_err(storage)?,
        status: status.parse().map_err(storage)?,
        threshold_days: row.get::<i64, _>("threshold_days") as u32,
        articles_deleted: row.get::<i64, _>("articles_deleted") as u64,
        deleted_articles: serde_json::from_str(&deleted).map_err(storage)?,
        error_message: row.get("error_message"),
    })
}

#[async_trait]
impl CleanupStore for SqliteCleanupStore {
    async fn load_settings(&self) -> Result<Option<CleanupSettings>, CleanupError> {
        load_option(&self.pool, SETTINGS_OPTION)
            .await
            .map_err(storage)
    }

    async fn save_settings(&self, settings: &CleanupSettings) -> Result<(), CleanupError> {
        save_option(&self.pool, SETTINGS_OPTION, settings)
            .await
            .map_err(storage)
    }

    async fn open_log(&self, new: NewCleanupLog) -> Result<CleanupLog, CleanupError> {
        let row = sqlx::query(
            r#"
            INSERT INTO cleanup_logs (cleanup_type, triggered_by, started_at, status, threshold_days)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.cleanup_type.as_str())
        .bind(new.triggered_by)
        .bind(encode_ts(new.started_at))
        .bind(CleanupStatus::Running.as_str())
        .bind(new.threshold_days as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        row_to_log(&row)
    }

    async fn close_log(&self, log: &CleanupLog) -> Result<(), CleanupError> {
        let deleted = serde_json::to_string(&log.deleted_articles).map_err(storage)?;
        let result = sqlx::query(
            r#"
            UPDATE cleanup_logs SET
                completed_at = ?, status = ?, articles_deleted = ?,
                deleted_articles = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(log.completed_at.map(encode_ts))
        .bind(log.status.as_str())
        .bind(log.articles_deleted as i64)
        .bind(deleted)
        .bind(&log.error_message)
        .bind(log.id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(CleanupError::StorageError(format!(
                "cleanup log {} does not exist",
                log.id
            )));
        }
        Ok(())
    }

    async fn get_log(&self, id: i64) -> Result<Option<CleanupLog>, CleanupError> {
        let row = sqlx::query("SELECT * FROM cleanup_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(row_to_log).transpose()
    }

    async fn list_logs(
        &self,
        filter: &CleanupLogFilter,
    ) -> Result<(Vec<CleanupLog>, u64), CleanupError> {
        let cleanup_type = filter.cleanup_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());

        const WHERE: &str = r"
            WHERE (?1 IS NULL OR cleanup_type = ?1)
              AND (?2 IS NULL OR status = ?2)";

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM cleanup_logs {}", WHERE))
            .bind(cleanup_type)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?
            .get("n");

        let rows = sqlx::query(&format!(
            "SELECT * FROM cleanup_logs {} ORDER BY started_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            WHERE
        ))
        .bind(cleanup_type)
        .bind(status)
        .bind(filter.per_page as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let logs = rows.iter().map(row_to_log).collect::<Result<_, _>>()?;
        Ok((logs, total as u64))
    }

    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<CleanupLog>, CleanupError> {
        let rows = sqlx::query("SELECT * FROM cleanup_logs WHERE started_at >= ? ORDER BY id ASC")
            .bind(encode_ts(since))
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(row_to_log).collect()
    }

    async fn try_acquire_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError> {
        let now = Utc::now();
        let expired = sqlx::query("DELETE FROM advisory_locks WHERE name = ? AND acquired_at < ?")
            .bind(name)
            .bind(encode_ts(now - Duration::seconds(LOCK_TTL_SECS)))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if expired.rows_affected() > 0 {
            tracing::warn!(lock = name, "Reclaimed abandoned lock");
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO advisory_locks (name, holder, acquired_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(holder)
        .bind(encode_ts(now))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn renew_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError> {
        let renewed = sqlx::query(
            "UPDATE advisory_locks SET acquired_at = ? WHERE name = ? AND holder = ?",
        )
        .bind(encode_ts(Utc::now()))
        .bind(name)
        .bind(holder)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(renewed.rows_affected() == 1)
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<(), CleanupError> {
        sqlx::query("DELETE FROM advisory_locks WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
