use crate::core::audit::{AuditError, AuditFilter, AuditLogEntry, AuditStore, NewAuditEntry};
use crate::infra::sqlite_support::{decode_ts, encode_ts, like_pattern};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

impl SqliteAuditStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                action TEXT NOT NULL,
                resource_type TEXT,
                resource_id INTEGER,
                old_values TEXT,
                new_values TEXT,
                ip_address TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs (created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_logs_action ON audit_logs (action)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// Every filter field is optional; a NULL parameter disables its clause.
const WHERE: &str = r"
    WHERE (?1 IS NULL OR user_id = ?1)
      AND (?2 IS NULL OR action = ?2)
      AND (?3 IS NULL OR resource_type = ?3)
      AND (?4 IS NULL OR created_at >= ?4)
      AND (?5 IS NULL OR created_at <= ?5)
      AND (?6 IS NULL OR id <= ?6)
      AND (?7 IS NULL
           OR LOWER(action) LIKE ?7 ESCAPE '\'
           OR LOWER(COALESCE(resource_type, '')) LIKE ?7 ESCAPE '\'
           OR CAST(resource_id AS TEXT) LIKE ?7 ESCAPE '\'
           OR LOWER(COALESCE(old_values, '')) LIKE ?7 ESCAPE '\'
           OR LOWER(COALESCE(new_values, '')) LIKE ?7 ESCAPE '\'
           OR LOWER(COALESCE(ip_address, '')) LIKE ?7 ESCAPE '\')";

struct FilterParams {
    user_id: Option<i64>,
    action: Option<String>,
    resource_type: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    max_id: Option<i64>,
    search: Option<String>,
}

impl From<&AuditFilter> for FilterParams {
    fn from(filter: &AuditFilter) -> Self {
        Self {
            user_id: filter.user_id,
            action: filter.action.clone(),
            resource_type: filter.resource_type.clone(),
            date_from: filter.date_from.map(encode_ts),
            date_to: filter.date_to.map(encode_ts),
            max_id: filter.max_id,
            search: filter
                .search
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| like_pattern(&s.to_lowercase())),
        }
    }
}

fn storage(e: impl std::fmt::Display) -> AuditError {
    AuditError::StorageError(e.to_string())
}

fn encode_values(values: &Option<Value>) -> Option<String> {
    values.as_ref().map(Value::to_string)
}

fn decode_values(raw: Option<String>) -> Result<Option<Value>, AuditError> {
    raw.map(|s| serde_json::from_str(&s).map_err(storage))
        .transpose()
}

fn row_to_entry(row: &SqliteRow) -> Result<AuditLogEntry, AuditError> {
    let created_at: String = row.get("created_at");
    Ok(AuditLogEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        action: row.get("action"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        old_values: decode_values(row.get("old_values"))?,
        new_values: decode_values(row.get("new_values"))?,
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: decode_ts(&created_at).map_err(storage)?,
    })
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError> {
        let row = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (user_id, action, resource_type, resource_id, old_values, new_values,
                 ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.resource_type.map(|r| r.as_str()))
        .bind(entry.resource_id)
        .bind(encode_values(&entry.old_values))
        .bind(encode_values(&entry.new_values))
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(encode_ts(entry.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        row_to_entry(&row)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let p = FilterParams::from(filter);
        let rows = sqlx::query(&format!(
            "SELECT * FROM audit_logs {} ORDER BY created_at DESC, id DESC LIMIT ?8 OFFSET ?9",
            WHERE
        ))
        .bind(p.user_id)
        .bind(p.action.as_deref())
        .bind(p.resource_type.as_deref())
        .bind(p.date_from.as_deref())
        .bind(p.date_to.as_deref())
        .bind(p.max_id)
        .bind(p.search.as_deref())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn count(&self, filter: &AuditFilter) -> Result<u64, AuditError> {
        let p = FilterParams::from(filter);
        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM audit_logs {}", WHERE))
            .bind(p.user_id)
            .bind(p.action.as_deref())
            .bind(p.resource_type.as_deref())
            .bind(p.date_from.as_deref())
            .bind(p.date_to.as_deref())
            .bind(p.max_id)
            .bind(p.search.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?
            .get("n");
        Ok(total as u64)
    }

    async fn max_id(&self) -> Result<Option<i64>, AuditError> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM audit_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get("max_id"))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditError> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < ?")
            .bind(encode_ts(cutoff))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }
}
