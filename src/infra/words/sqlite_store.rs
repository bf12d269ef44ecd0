use crate::core::words::{
    SensitiveWord, WordDraft, WordError, WordFilter, WordStatistics, WordStore, WordType,
};
use crate::infra::sqlite_support::{decode_ts, encode_ts, like_pattern};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteWordStore {
    pool: Pool<Sqlite>,
}

impl SqliteWordStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensitive_words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                term TEXT NOT NULL,
                word_type TEXT NOT NULL,
                replacement TEXT NOT NULL,
                is_builtin BOOLEAN NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_by INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (term, word_type)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn storage(e: impl std::fmt::Display) -> WordError {
    WordError::StorageError(e.to_string())
}

/// Unique violations on `(term, word_type)` become `Duplicate`.
fn write_error(e: sqlx::Error, term: &str, word_type: WordType) -> WordError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => WordError::Duplicate {
            term: term.to_string(),
            word_type,
        },
        _ => storage(e),
    }
}

fn row_to_word(row: &SqliteRow) -> Result<SensitiveWord, WordError> {
    let word_type: String = row.get("word_type");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(SensitiveWord {
        id: row.get("id"),
        term: row.get("term"),
        word_type: word_type.parse().map_err(storage)?,
        replacement: row.get("replacement"),
        is_builtin: row.get("is_builtin"),
        is_active: row.get("is_active"),
        created_by: row.get("created_by"),
        created_at: decode_ts(&created_at).map_err(storage)?,
        updated_at: decode_ts(&updated_at).map_err(storage)?,
    })
}

#[async_trait]
impl WordStore for SqliteWordStore {
    async fn insert(&self, draft: WordDraft) -> Result<SensitiveWord, WordError> {
        let created = encode_ts(draft.created_at);
        let row = sqlx::query(
            r#"
            INSERT INTO sensitive_words
                (term, word_type, replacement, is_builtin, is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&draft.term)
        .bind(draft.word_type.as_str())
        .bind(&draft.replacement)
        .bind(draft.is_builtin)
        .bind(draft.is_active)
        .bind(draft.created_by)
        .bind(&created)
        .bind(&created)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &draft.term, draft.word_type))?;
        row_to_word(&row)
    }

    async fn update(&self, word: &SensitiveWord) -> Result<(), WordError> {
        let result = sqlx::query(
            r#"
            UPDATE sensitive_words SET
                term = ?, word_type = ?, replacement = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&word.term)
        .bind(word.word_type.as_str())
        .bind(&word.replacement)
        .bind(word.is_active)
        .bind(encode_ts(word.updated_at))
        .bind(word.id)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &word.term, word.word_type))?;
        if result.rows_affected() == 0 {
            return Err(WordError::NotFound(word.id));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<SensitiveWord>, WordError> {
        let row = sqlx::query("SELECT * FROM sensitive_words WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(row_to_word).transpose()
    }

    async fn find_by_term(
        &self,
        term: &str,
        word_type: WordType,
    ) -> Result<Option<SensitiveWord>, WordError> {
        let row = sqlx::query("SELECT * FROM sensitive_words WHERE term = ? AND word_type = ?")
            .bind(term)
            .bind(word_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(row_to_word).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, WordError> {
        let result = sqlx::query("DELETE FROM sensitive_words WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &WordFilter) -> Result<(Vec<SensitiveWord>, u64), WordError> {
        let word_type = filter.word_type.map(|t| t.as_str());
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| like_pattern(&s.to_lowercase()));

        const WHERE: &str = r"
            WHERE (?1 IS NULL OR word_type = ?1)
              AND (?2 IS NULL OR is_active = ?2)
              AND (?3 IS NULL OR is_builtin = ?3)
              AND (?4 IS NULL OR LOWER(term) LIKE ?4 ESCAPE '\')";

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM sensitive_words {}",
            WHERE
        ))
        .bind(word_type)
        .bind(filter.is_active)
        .bind(filter.is_builtin)
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?
        .get("n");

        let rows = sqlx::query(&format!(
            "SELECT * FROM sensitive_words {} ORDER BY id ASC LIMIT ?5 OFFSET ?6",
            WHERE
        ))
        .bind(word_type)
        .bind(filter.is_active)
        .bind(filter.is_builtin)
        .bind(search.as_deref())
        .bind(filter.per_page as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let words = rows.iter().map(row_to_word).collect::<Result<_, _>>()?;
        Ok((words, total as u64))
    }

    async fn active_words(&self) -> Result<Vec<SensitiveWord>, WordError> {
        let rows = sqlx::query("SELECT * FROM sensitive_words WHERE is_active = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(row_to_word).collect()
    }

    async fn statistics(&self) -> Result<WordStatistics, WordError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(word_type = 'normal'), 0) AS normal,
                COALESCE(SUM(word_type = 'high_risk'), 0) AS high_risk,
                COALESCE(SUM(is_active = 1), 0) AS active,
                COALESCE(SUM(is_builtin = 1), 0) AS builtin
            FROM sensitive_words
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        let total = row.get::<i64, _>("total") as u64;
        let active = row.get::<i64, _>("active") as u64;
        let builtin = row.get::<i64, _>("builtin") as u64;
        Ok(WordStatistics {
            total,
            normal: row.get::<i64, _>("normal") as u64,
            high_risk: row.get::<i64, _>("high_risk") as u64,
            active,
            inactive: total - active,
            builtin,
            custom: total - builtin,
        })
    }
}
