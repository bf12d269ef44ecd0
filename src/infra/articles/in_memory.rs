// In-memory ArticleStore.
//
// Version checks run under the DashMap shard lock, so two writers holding the
// same version cannot both succeed.

use crate::core::articles::{
    AgeBasis, Article, ArticleDraft, ArticleError, ArticleFilter, ArticleStatus, ArticleStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct InMemoryArticleStore {
    articles: DashMap<i64, Article>,
    next_id: AtomicI64,
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self {
            articles: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Store `article` as-is, bypassing version checks. For seeding fixtures.
    pub fn put(&self, article: Article) {
        self.next_id.fetch_max(article.id + 1, Ordering::SeqCst);
        self.articles.insert(article.id, article);
    }
}

impl Default for InMemoryArticleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn insert(&self, draft: ArticleDraft) -> Result<Article, ArticleError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let article = Article {
            id,
            title: draft.title,
            content: draft.content,
            excerpt: draft.excerpt,
            author_id: draft.author_id,
            status: draft.status,
            tags: draft.tags,
            moderation_notes: String::new(),
            version: 1,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        self.articles.insert(id, article.clone());
        Ok(article)
    }

    async fn get(&self, id: i64) -> Result<Option<Article>, ArticleError> {
        Ok(self.articles.get(&id).map(|a| a.value().clone()))
    }

    async fn update(&self, article: &Article) -> Result<Article, ArticleError> {
        let mut stored = self
            .articles
            .get_mut(&article.id)
            .ok_or(ArticleError::NotFound(article.id))?;
        if stored.version != article.version {
            return Err(ArticleError::Conflict(article.id));
        }
        let mut next = article.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: i64, expected_version: i64) -> Result<(), ArticleError> {
        match self.articles.entry(id) {
            Entry::Vacant(_) => Err(ArticleError::NotFound(id)),
            Entry::Occupied(entry) if entry.get().version != expected_version => {
                Err(ArticleError::Conflict(id))
            }
            Entry::Occupied(entry) => {
                entry.remove();
                Ok(())
            }
        }
    }

    async fn list(&self, filter: &ArticleFilter) -> Result<(Vec<Article>, u64), ArticleError> {
        let mut matching: Vec<Article> = self
            .articles
            .iter()
            .filter(|a| filter.matches(a.value()))
            .map(|a| a.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_stale(
        &self,
        statuses: &[ArticleStatus],
        basis: AgeBasis,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, ArticleError> {
        let mut stale: Vec<(DateTime<Utc>, i64)> = self
            .articles
            .iter()
            .filter(|a| statuses.contains(&a.status) && basis.timestamp_of(a.value()) < cutoff)
            .map(|a| (basis.timestamp_of(a.value()), a.id))
            .collect();
        stale.sort();
        Ok(stale.into_iter().map(|(_, id)| id).collect())
    }

    async fn status_counts(&self) -> Result<Vec<(ArticleStatus, u64)>, ArticleError> {
        let mut counts: Vec<(ArticleStatus, u64)> = Vec::new();
        for article in self.articles.iter() {
            match counts.iter_mut().find(|(s, _)| *s == article.status) {
                Some((_, n)) => *n += 1,
                None => counts.push((article.status, 1)),
            }
        }
        Ok(counts)
    }
}
