use crate::core::articles::{
    AgeBasis, Article, ArticleDraft, ArticleError, ArticleFilter, ArticleStatus, ArticleStore,
};
use crate::infra::sqlite_support::{decode_ts, encode_ts, like_pattern};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

pub struct SqliteArticleStore {
    pool: Pool<Sqlite>,
}

impl SqliteArticleStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT NOT NULL DEFAULT '',
                author_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                moderation_notes TEXT NOT NULL DEFAULT '',
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_status_created ON articles (status, created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool, ArticleError> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.is_some())
    }
}

fn storage(e: impl std::fmt::Display) -> ArticleError {
    ArticleError::StorageError(e.to_string())
}

fn row_to_article(row: &SqliteRow) -> Result<Article, ArticleError> {
    let status: String = row.get("status");
    let tags: String = row.get("tags");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        author_id: row.get("author_id"),
        status: status.parse().map_err(storage)?,
        tags: serde_json::from_str(&tags).map_err(storage)?,
        moderation_notes: row.get("moderation_notes"),
        version: row.get("version"),
        created_at: decode_ts(&created_at).map_err(storage)?,
        updated_at: decode_ts(&updated_at).map_err(storage)?,
    })
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn insert(&self, draft: ArticleDraft) -> Result<Article, ArticleError> {
        let tags = serde_json::to_string(&draft.tags).map_err(storage)?;
        let created = encode_ts(draft.created_at);
        let row = sqlx::query(
            r#"
            INSERT INTO articles (title, content, excerpt, author_id, status, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&draft.excerpt)
        .bind(draft.author_id)
        .bind(draft.status.as_str())
        .bind(tags)
        .bind(&created)
        .bind(&created)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        row_to_article(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<Article>, ArticleError> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn update(&self, article: &Article) -> Result<Article, ArticleError> {
        let tags = serde_json::to_string(&article.tags).map_err(storage)?;
        let row = sqlx::query(
            r#"
            UPDATE articles SET
                title = ?, content = ?, excerpt = ?, status = ?, tags = ?,
                moderation_notes = ?, updated_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            RETURNING *
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.excerpt)
        .bind(article.status.as_str())
        .bind(tags)
        .bind(&article.moderation_notes)
        .bind(encode_ts(article.updated_at))
        .bind(article.id)
        .bind(article.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row_to_article(&row),
            None if self.exists(article.id).await? => Err(ArticleError::Conflict(article.id)),
            None => Err(ArticleError::NotFound(article.id)),
        }
    }

    async fn delete(&self, id: i64, expected_version: i64) -> Result<(), ArticleError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ? AND version = ?")
            .bind(id)
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 1 {
            Ok(())
        } else if self.exists(id).await? {
            Err(ArticleError::Conflict(id))
        } else {
            Err(ArticleError::NotFound(id))
        }
    }

    async fn list(&self, filter: &ArticleFilter) -> Result<(Vec<Article>, u64), ArticleError> {
        let status = filter.status.map(|s| s.as_str());
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| like_pattern(&s.to_lowercase()));

        const WHERE: &str = r"
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR author_id = ?2)
              AND (?3 IS NULL OR LOWER(title) LIKE ?3 ESCAPE '\')";

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM articles {}", WHERE))
            .bind(status)
            .bind(filter.author_id)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?
            .get("n");

        let rows = sqlx::query(&format!(
            "SELECT * FROM articles {} ORDER BY created_at DESC, id DESC LIMIT ?4 OFFSET ?5",
            WHERE
        ))
        .bind(status)
        .bind(filter.author_id)
        .bind(search.as_deref())
        .bind(filter.per_page as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let articles = rows.iter().map(row_to_article).collect::<Result<_, _>>()?;
        Ok((articles, total as u64))
    }

    async fn find_stale(
        &self,
        statuses: &[ArticleStatus],
        basis: AgeBasis,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, ArticleError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let column = match basis {
            AgeBasis::CreatedAt => "created_at",
            AgeBasis::UpdatedAt => "updated_at",
        };

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM articles WHERE status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        query.push(format!(") AND {} < ", column));
        query.push_bind(encode_ts(cutoff));
        query.push(format!(" ORDER BY {} ASC, id ASC", column));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
    }

    async fn status_counts(&self) -> Result<Vec<(ArticleStatus, u64)>, ArticleError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM articles GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter()
            .map(|row| -> Result<(ArticleStatus, u64), ArticleError> {
                let status: String = row.get("status");
                let n: i64 = row.get("n");
                Ok((status.parse().map_err(storage)?, n as u64))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::sqlite_support::test_pool;
    use chrono::Duration;

    async fn store() -> (tempfile::TempDir, SqliteArticleStore) {
        let (dir, pool) = test_pool().await;
        let store = SqliteArticleStore::new(pool);
        store.migrate().await.unwrap();
        (dir, store)
    }

    fn draft(title: &str, status: ArticleStatus, age_days: i64) -> ArticleDraft {
        ArticleDraft {
            title: title.to_string(),
            content: "body".to_string(),
            excerpt: String::new(),
            author_id: 3,
            status,
            tags: vec!["news".to_string()],
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_insert_get_and_versioned_update() {
        let (_dir, store) = store().await;
        let article = store
            .insert(draft("Hello", ArticleStatus::Draft, 0))
            .await
            .unwrap();
        assert_eq!(article.version, 1);
        assert_eq!(article.tags, vec!["news".to_string()]);

        let mut edited = article.clone();
        edited.title = "Hello again".to_string();
        let saved = store.update(&edited).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.get(article.id).await.unwrap().unwrap().title, "Hello again");

        assert!(matches!(
            store.update(&edited).await,
            Err(ArticleError::Conflict(_))
        ));
        assert!(matches!(
            store.delete(article.id, 1).await,
            Err(ArticleError::Conflict(_))
        ));
        store.delete(article.id, 2).await.unwrap();
        assert!(matches!(
            store.delete(article.id, 2).await,
            Err(ArticleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_stale_orders_oldest_first() {
        let (_dir, store) = store().await;
        let newer = store
            .insert(draft("a", ArticleStatus::Published, 40))
            .await
            .unwrap();
        let older = store
            .insert(draft("b", ArticleStatus::Rejected, 60))
            .await
            .unwrap();
        store
            .insert(draft("c", ArticleStatus::Draft, 90))
            .await
            .unwrap();
        store
            .insert(draft("d", ArticleStatus::Published, 5))
            .await
            .unwrap();

        let ids = store
            .find_stale(
                &[ArticleStatus::Published, ArticleStatus::Rejected],
                AgeBasis::CreatedAt,
                Utc::now() - Duration::days(30),
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_list_filters_and_counts() {
        let (_dir, store) = store().await;
        store
            .insert(draft("Rust weekly", ArticleStatus::Published, 2))
            .await
            .unwrap();
        store
            .insert(draft("Go weekly", ArticleStatus::Published, 1))
            .await
            .unwrap();
        store
            .insert(draft("Rust daily", ArticleStatus::Draft, 0))
            .await
            .unwrap();

        let filter = ArticleFilter {
            status: Some(ArticleStatus::Published),
            search: Some("rust".to_string()),
            ..Default::default()
        };
        let (articles, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(articles[0].title, "Rust weekly");

        let (all, total) = store.list(&ArticleFilter::default()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all[0].title, "Rust daily");

        let mut counts = store.status_counts().await.unwrap();
        counts.sort_by_key(|(s, _)| s.as_str());
        assert_eq!(
            counts,
            vec![(ArticleStatus::Draft, 1), (ArticleStatus::Published, 2)]
        );
    }
}
