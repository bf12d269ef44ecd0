// Article service - the lifecycle state machine.
//
// Every status change is checked against the transition table, the caller's
// capabilities, and (when entering a reviewable status) the moderation
// engine. Writes use optimistic versioning, so two moderators acting on the
// same article cannot silently overwrite each other.

use super::article_models::{
    normalize_tags, AgeBasis, Article, ArticleDraft, ArticleFilter, ArticlePage, ArticlePatch,
    ArticleStatus, BatchFailure, BatchFailureReason, BatchStatusResult, NewArticle,
    TransitionPolicy, MAX_TITLE_CHARS,
};
use crate::core::access::{Actor, Capability, PermissionChecker};
use crate::core::audit::{AuditAction, AuditEvent, AuditLogger, ResourceType};
use crate::core::moderation::{ModerationEngine, ModerationVerdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Article {0} not found")]
    NotFound(i64),

    #[error("Cannot move article from {from} to {to}")]
    InvalidTransition {
        from: ArticleStatus,
        to: ArticleStatus,
    },

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Content rejected by moderation: {}", .0.reasons.join("; "))]
    ModerationRejected(Box<ModerationVerdict>),

    #[error("Article {0} was modified concurrently")]
    Conflict(i64),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ArticleError {
    fn batch_reason(&self) -> BatchFailureReason {
        match self {
            ArticleError::ValidationError(_) => BatchFailureReason::Validation,
            ArticleError::NotFound(_) => BatchFailureReason::NotFound,
            ArticleError::InvalidTransition { .. } => BatchFailureReason::InvalidTransition,
            ArticleError::PermissionDenied => BatchFailureReason::PermissionDenied,
            ArticleError::ModerationRejected(_) => BatchFailureReason::ModerationRejected,
            ArticleError::Conflict(_) => BatchFailureReason::Conflict,
            ArticleError::StorageError(_) => BatchFailureReason::Storage,
        }
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert with `version = 1`.
    async fn insert(&self, draft: ArticleDraft) -> Result<Article, ArticleError>;

    async fn get(&self, id: i64) -> Result<Option<Article>, ArticleError>;

    /// Write every mutable field if the stored version still equals
    /// `article.version`. Returns the stored article with its new version.
    ///
    /// `Conflict` if the version moved on, `NotFound` if the row is gone.
    async fn update(&self, article: &Article) -> Result<Article, ArticleError>;

    /// Delete if the stored version equals `expected_version`.
    async fn delete(&self, id: i64, expected_version: i64) -> Result<(), ArticleError>;

    /// Articles matching the filter (paged, newest first) and the unpaged total.
    async fn list(&self, filter: &ArticleFilter) -> Result<(Vec<Article>, u64), ArticleError>;

    /// Ids of articles in one of `statuses` whose `basis` timestamp is
    /// strictly before `cutoff`, oldest first.
    async fn find_stale(
        &self,
        statuses: &[ArticleStatus],
        basis: AgeBasis,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, ArticleError>;

    async fn status_counts(&self) -> Result<Vec<(ArticleStatus, u64)>, ArticleError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ArticleService {
    store: Arc<dyn ArticleStore>,
    moderation: Arc<ModerationEngine>,
    permissions: Arc<dyn PermissionChecker>,
    audit: Arc<AuditLogger>,
    policy: TransitionPolicy,
}

impl ArticleService {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        moderation: Arc<ModerationEngine>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<AuditLogger>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            store,
            moderation,
            permissions,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Move an article to `new_status`.
    ///
    /// Checks, in order: the transition table, the actor's rights, and, when
    /// entering a reviewable status, the moderation verdict. Masked fields
    /// from the verdict are stored with the new status.
    pub async fn change_status(
        &self,
        article_id: i64,
        new_status: ArticleStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<Article, ArticleError> {
        let mut article = self.get_article(article_id).await?;
        let old_status = article.status;

        if !old_status.can_transition_to(new_status, self.policy) {
            return Err(ArticleError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let is_moderator = self.is_moderator(actor).await;
        let allowed = if old_status.is_moderated() || new_status.is_moderated() {
            is_moderator
        } else {
            is_moderator || actor.owns(article.author_id)
        };
        if !allowed {
            return Err(ArticleError::PermissionDenied);
        }

        if new_status.requires_content_check() {
            let author = Actor::user(article.author_id);
            let outcome = self
                .moderation
                .moderate_article(&article.title, &article.content, &article.excerpt, &author)
                .await;
            if outcome.verdict.is_rejected() {
                tracing::info!(
                    article_id,
                    from = %old_status,
                    to = %new_status,
                    "Status change blocked by moderation"
                );
                return Err(ArticleError::ModerationRejected(Box::new(outcome.verdict)));
            }
            article.title = outcome.title;
            article.content = outcome.content;
            article.excerpt = outcome.excerpt;
        }

        article.status = new_status;
        if let Some(notes) = notes {
            article.append_notes(notes);
        }
        article.updated_at = Utc::now();

        let saved = self.store.update(&article).await?;

        tracing::info!(
            article_id,
            from = %old_status,
            to = %new_status,
            actor = ?actor.user_id,
            "Article status changed"
        );

        let event = AuditEvent::new(AuditAction::ArticleStatusChange)
            .on(ResourceType::Article, Some(article_id))
            .old_values(json!({ "status": old_status.as_str() }))
            .new_values(json!({ "status": new_status.as_str(), "notes": notes }));
        self.audit.record(actor, event).await;

        Ok(saved)
    }

    /// Apply `change_status` to each id in turn. One failure never stops the rest.
    pub async fn batch_update_status(
        &self,
        article_ids: &[i64],
        new_status: ArticleStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> BatchStatusResult {
        let mut result = BatchStatusResult::default();

        for &id in article_ids {
            match self.change_status(id, new_status, actor, notes).await {
                Ok(_) => result.succeeded.push(id),
                Err(e) => result.failed.push(BatchFailure {
                    article_id: id,
                    reason: e.batch_reason(),
                    message: e.to_string(),
                }),
            }
        }

        tracing::info!(
            to = %new_status,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Batch status update finished"
        );

        result
    }

    // ------------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------------

    /// Create an article owned by `actor`. With `submit` set the content is
    /// moderated and the article starts in `pending_review`.
    pub async fn create_article(
        &self,
        actor: &Actor,
        new: NewArticle,
    ) -> Result<Article, ArticleError> {
        let author_id = actor.user_id.ok_or(ArticleError::PermissionDenied)?;
        let title = validate_title(&new.title)?;

        let mut draft = ArticleDraft {
            title,
            content: new.content,
            excerpt: new.excerpt.trim().to_string(),
            author_id,
            status: ArticleStatus::Draft,
            tags: normalize_tags(new.tags),
            created_at: Utc::now(),
        };

        if new.submit {
            let outcome = self
                .moderation
                .moderate_article(&draft.title, &draft.content, &draft.excerpt, actor)
                .await;
            if outcome.verdict.is_rejected() {
                return Err(ArticleError::ModerationRejected(Box::new(outcome.verdict)));
            }
            draft.title = outcome.title;
            draft.content = outcome.content;
            draft.excerpt = outcome.excerpt;
            draft.status = ArticleStatus::PendingReview;
        }

        let article = self.store.insert(draft).await?;

        tracing::info!(
            article_id = article.id,
            author_id,
            status = %article.status,
            "Article created"
        );
        let event = AuditEvent::new(AuditAction::ArticleCreate)
            .on(ResourceType::Article, Some(article.id))
            .new_values(article.audit_snapshot());
        self.audit.record(actor, event).await;

        Ok(article)
    }

    /// Edit an article's text or tags.
    ///
    /// Authors may edit while the article is a draft or pending review;
    /// moderators may edit at any status. Text changes outside `draft` are
    /// moderated again.
    pub async fn update_article(
        &self,
        article_id: i64,
        patch: ArticlePatch,
        actor: &Actor,
    ) -> Result<Article, ArticleError> {
        let mut article = self.get_article(article_id).await?;
        let old = article.audit_snapshot();

        let author_may_edit = actor.owns(article.author_id) && article.status.is_author_editable();
        if !author_may_edit && !self.is_moderator(actor).await {
            return Err(ArticleError::PermissionDenied);
        }

        let touches_text = patch.touches_text();
        if let Some(title) = patch.title.as_deref() {
            article.title = validate_title(title)?;
        }
        if let Some(content) = patch.content {
            article.content = content;
        }
        if let Some(excerpt) = patch.excerpt {
            article.excerpt = excerpt.trim().to_string();
        }
        if let Some(tags) = patch.tags {
            article.tags = normalize_tags(tags);
        }

        if touches_text && article.status.requires_content_check() {
            let author = Actor::user(article.author_id);
            let outcome = self
                .moderation
                .moderate_article(&article.title, &article.content, &article.excerpt, &author)
                .await;
            if outcome.verdict.is_rejected() {
                return Err(ArticleError::ModerationRejected(Box::new(outcome.verdict)));
            }
            article.title = outcome.title;
            article.content = outcome.content;
            article.excerpt = outcome.excerpt;
        }

        article.updated_at = Utc::now();
        let saved = self.store.update(&article).await?;

        let event = AuditEvent::new(AuditAction::ArticleUpdate)
            .on(ResourceType::Article, Some(article_id))
            .old_values(old)
            .new_values(saved.audit_snapshot());
        self.audit.record(actor, event).await;

        Ok(saved)
    }

    /// Delete an article. Authors may delete their own drafts and pending
    /// submissions; everything else needs a moderator.
    pub async fn delete_article(&self, article_id: i64, actor: &Actor) -> Result<(), ArticleError> {
        let article = self.get_article(article_id).await?;

        let author_may_delete =
            actor.owns(article.author_id) && article.status.is_author_editable();
        if !author_may_delete && !self.is_moderator(actor).await {
            return Err(ArticleError::PermissionDenied);
        }

        self.store.delete(article_id, article.version).await?;

        tracing::info!(article_id, actor = ?actor.user_id, "Article deleted");
        let event = AuditEvent::new(AuditAction::ArticleDelete)
            .on(ResourceType::Article, Some(article_id))
            .old_values(article.audit_snapshot());
        self.audit.record(actor, event).await;

        Ok(())
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Article, ArticleError> {
        self.store
            .get(article_id)
            .await?
            .ok_or(ArticleError::NotFound(article_id))
    }

    pub async fn list_articles(&self, filter: &ArticleFilter) -> Result<ArticlePage, ArticleError> {
        let (articles, total) = self.store.list(filter).await?;
        Ok(ArticlePage {
            articles,
            total,
            page: filter.page.max(1),
            per_page: filter.per_page,
        })
    }

    /// Number of articles in each status, zero counts included.
    pub async fn status_counts(&self) -> Result<Vec<(ArticleStatus, u64)>, ArticleError> {
        let stored = self.store.status_counts().await?;
        Ok(ArticleStatus::ALL
            .iter()
            .map(|status| {
                let count = stored
                    .iter()
                    .find(|(s, _)| s == status)
                    .map_or(0, |(_, c)| *c);
                (*status, count)
            })
            .collect())
    }

    async fn is_moderator(&self, actor: &Actor) -> bool {
        self.permissions
            .has_capability(actor, Capability::ModerateArticles)
            .await
    }
}

fn validate_title(title: &str) -> Result<String, ArticleError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ArticleError::ValidationError("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ArticleError::ValidationError(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::AuditFilter;
    use crate::core::words::{SensitiveWordService, WordType};
    use crate::infra::articles::InMemoryArticleStore;
    use crate::infra::audit::InMemoryAuditStore;
    use crate::infra::moderation::InMemorySettingsStore;
    use crate::infra::permissions::StaticPermissions;
    use crate::infra::words::InMemoryWordStore;

    const AUTHOR: i64 = 10;
    const MODERATOR: i64 = 99;
    const STRANGER: i64 = 11;

    struct Fixture {
        service: ArticleService,
        store: Arc<InMemoryArticleStore>,
        words: Arc<SensitiveWordService>,
        audit: Arc<AuditLogger>,
    }

    fn fixture_with_policy(policy: TransitionPolicy) -> Fixture {
        let permissions = Arc::new(StaticPermissions::moderators([MODERATOR]));
        let audit = Arc::new(AuditLogger::new(
            Arc::new(InMemoryAuditStore::new()),
            permissions.clone(),
        ));
        let words = Arc::new(SensitiveWordService::new(
            Arc::new(InMemoryWordStore::new()),
            permissions.clone(),
            audit.clone(),
        ));
        let engine = Arc::new(ModerationEngine::new(
            words.clone(),
            Arc::new(InMemorySettingsStore::new()),
            permissions.clone(),
            audit.clone(),
        ));
        let store = Arc::new(InMemoryArticleStore::new());
        let service =
            ArticleService::new(store.clone(), engine, permissions, audit.clone(), policy);
        Fixture {
            service,
            store,
            words,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_policy(TransitionPolicy::default())
    }

    async fn draft(f: &Fixture, title: &str, content: &str) -> Article {
        f.service
            .create_article(
                &Actor::user(AUTHOR),
                NewArticle {
                    title: title.to_string(),
                    content: content.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let f = fixture();
        let article = draft(&f, "Hello", "World").await;
        assert_eq!(article.status, ArticleStatus::Draft);
        assert_eq!(article.version, 1);

        let author = Actor::user(AUTHOR);
        let moderator = Actor::user(MODERATOR);

        let a = f
            .service
            .change_status(article.id, ArticleStatus::PendingReview, &author, None)
            .await
            .unwrap();
        assert_eq!(a.status, ArticleStatus::PendingReview);

        let a = f
            .service
            .change_status(article.id, ArticleStatus::Approved, &moderator, Some("looks good"))
            .await
            .unwrap();
        let a2 = f
            .service
            .change_status(a.id, ArticleStatus::Published, &moderator, Some("shipping"))
            .await
            .unwrap();
        assert_eq!(a2.status, ArticleStatus::Published);
        assert_eq!(a2.moderation_notes, "looks good\nshipping");
        assert_eq!(a2.version, 4);
    }

    #[tokio::test]
    async fn test_every_invalid_transition_is_rejected() {
        let policy = TransitionPolicy::default();
        for from in ArticleStatus::ALL {
            for to in ArticleStatus::ALL {
                if from.can_transition_to(to, policy) {
                    continue;
                }
                let f = fixture();
                let article = draft(&f, "t", "c").await;
                let mut forced = article.clone();
                forced.status = from;
                f.store.put(forced);

                let result = f
                    .service
                    .change_status(article.id, to, &Actor::user(MODERATOR), None)
                    .await;
                assert!(
                    matches!(result, Err(ArticleError::InvalidTransition { .. })),
                    "{} -> {} should be invalid",
                    from,
                    to
                );
            }
        }
    }

    #[tokio::test]
    async fn test_authors_cannot_approve_their_own_work() {
        let f = fixture();
        let article = draft(&f, "Mine", "text").await;
        let author = Actor::user(AUTHOR);

        f.service
            .change_status(article.id, ArticleStatus::PendingReview, &author, None)
            .await
            .unwrap();
        let result = f
            .service
            .change_status(article.id, ArticleStatus::Approved, &author, None)
            .await;
        assert!(matches!(result, Err(ArticleError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_strangers_cannot_submit_others_drafts() {
        let f = fixture();
        let article = draft(&f, "Mine", "text").await;
        let result = f
            .service
            .change_status(
                article.id,
                ArticleStatus::PendingReview,
                &Actor::user(STRANGER),
                None,
            )
            .await;
        assert!(matches!(result, Err(ArticleError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_submission_is_moderated() {
        let f = fixture();
        let op = Actor::user(MODERATOR);
        f.words.upsert("暴力", WordType::HighRisk, None, &op).await.unwrap();
        f.words.upsert("垃圾", WordType::Normal, None, &op).await.unwrap();

        let blocked = draft(&f, "标题", "这是暴力内容").await;
        let result = f
            .service
            .change_status(blocked.id, ArticleStatus::PendingReview, &Actor::user(AUTHOR), None)
            .await;
        match result {
            Err(ArticleError::ModerationRejected(verdict)) => {
                assert_eq!(verdict.flagged_keywords, vec!["暴力".to_string()]);
            }
            other => panic!("expected moderation rejection, got {:?}", other),
        }
        assert_eq!(
            f.service.get_article(blocked.id).await.unwrap().status,
            ArticleStatus::Draft
        );

        let masked = draft(&f, "垃圾标题", "这是垃圾").await;
        let a = f
            .service
            .change_status(masked.id, ArticleStatus::PendingReview, &Actor::user(AUTHOR), None)
            .await
            .unwrap();
        assert_eq!(a.title, "**标题");
        assert_eq!(a.content, "这是**");
    }

    #[tokio::test]
    async fn test_direct_publish_needs_policy() {
        let f = fixture();
        let article = draft(&f, "t", "c").await;
        f.service
            .change_status(article.id, ArticleStatus::PendingReview, &Actor::user(AUTHOR), None)
            .await
            .unwrap();
        let denied = f
            .service
            .change_status(article.id, ArticleStatus::Published, &Actor::user(MODERATOR), None)
            .await;
        assert!(matches!(denied, Err(ArticleError::InvalidTransition { .. })));

        let f = fixture_with_policy(TransitionPolicy {
            allow_direct_publish: true,
        });
        let article = draft(&f, "t", "c").await;
        f.service
            .change_status(article.id, ArticleStatus::PendingReview, &Actor::user(AUTHOR), None)
            .await
            .unwrap();
        let published = f
            .service
            .change_status(article.id, ArticleStatus::Published, &Actor::user(MODERATOR), None)
            .await
            .unwrap();
        assert_eq!(published.status, ArticleStatus::Published);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let f = fixture();
        let article = draft(&f, "t", "c").await;

        let mut stale = article.clone();
        stale.title = "first writer".to_string();
        f.store.update(&stale).await.unwrap();

        stale.title = "second writer".to_string();
        assert!(matches!(
            f.store.update(&stale).await,
            Err(ArticleError::Conflict(_))
        ));
        assert!(matches!(
            f.store.delete(article.id, article.version).await,
            Err(ArticleError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_status_change_is_audited() {
        let f = fixture();
        let article = draft(&f, "t", "c").await;
        f.service
            .change_status(
                article.id,
                ArticleStatus::PendingReview,
                &Actor::user(AUTHOR),
                Some("please review"),
            )
            .await
            .unwrap();

        let filter = AuditFilter {
            action: Some("article.status_change".to_string()),
            ..Default::default()
        };
        let logs = f
            .audit
            .get_logs(&Actor::user(MODERATOR), &filter, 1, 10)
            .await
            .unwrap()
            .logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].resource_id, Some(article.id));
        assert_eq!(logs[0].old_values, Some(json!({ "status": "draft" })));
        assert_eq!(
            logs[0].new_values,
            Some(json!({ "status": "pending_review", "notes": "please review" }))
        );
    }

    #[tokio::test]
    async fn test_batch_update_collects_failures() {
        let f = fixture();
        let a = draft(&f, "a", "a").await;
        let b = draft(&f, "b", "b").await;
        let author = Actor::user(AUTHOR);
        f.service
            .change_status(a.id, ArticleStatus::PendingReview, &author, None)
            .await
            .unwrap();

        let result = f
            .service
            .batch_update_status(
                &[a.id, b.id, 404],
                ArticleStatus::Approved,
                &Actor::user(MODERATOR),
                None,
            )
            .await;

        assert_eq!(result.succeeded, vec![a.id]);
        assert_eq!(result.failed.len(), 2);
        assert_eq!(result.failed[0].reason, BatchFailureReason::InvalidTransition);
        assert_eq!(result.failed[1].reason, BatchFailureReason::NotFound);
    }

    #[tokio::test]
    async fn test_batch_update_audits_each_success_once() {
        let f = fixture();
        let author = Actor::user(AUTHOR);
        let a = draft(&f, "a", "a").await;
        let b = draft(&f, "b", "b").await;
        let c = draft(&f, "c", "c").await;
        for id in [a.id, b.id] {
            f.service
                .change_status(id, ArticleStatus::PendingReview, &author, None)
                .await
                .unwrap();
        }

        let result = f
            .service
            .batch_update_status(
                &[a.id, b.id, c.id, 404],
                ArticleStatus::Approved,
                &Actor::user(MODERATOR),
                None,
            )
            .await;
        assert_eq!(result.succeeded, vec![a.id, b.id]);

        let filter = AuditFilter {
            action: Some("article.status_change".to_string()),
            ..Default::default()
        };
        let logs = f
            .audit
            .get_logs(&Actor::user(MODERATOR), &filter, 1, 50)
            .await
            .unwrap()
            .logs;
        let approvals: Vec<Option<i64>> = logs
            .iter()
            .filter(|log| {
                log.new_values.as_ref().and_then(|v| v.get("status")) == Some(&json!("approved"))
            })
            .map(|log| log.resource_id)
            .collect();
        assert_eq!(approvals.len(), 2);
        assert!(approvals.contains(&Some(a.id)));
        assert!(approvals.contains(&Some(b.id)));
        assert!(logs.iter().all(|log| log.resource_id != Some(c.id)));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let f = fixture();
        let author = Actor::user(AUTHOR);
        let a = draft(&f, "a", "a").await;
        f.service.delete_article(a.id, &author).await.unwrap();
        assert!(matches!(
            f.service.get_article(a.id).await,
            Err(ArticleError::NotFound(_))
        ));

        let b = draft(&f, "b", "b").await;
        f.service
            .change_status(b.id, ArticleStatus::PendingReview, &author, None)
            .await
            .unwrap();
        f.service
            .change_status(b.id, ArticleStatus::Approved, &Actor::user(MODERATOR), None)
            .await
            .unwrap();
        assert!(matches!(
            f.service.delete_article(b.id, &author).await,
            Err(ArticleError::PermissionDenied)
        ));
        f.service
            .delete_article(b.id, &Actor::user(MODERATOR))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_on_create_and_update_remoderates() {
        let f = fixture();
        let op = Actor::user(MODERATOR);
        f.words.upsert("暴力", WordType::HighRisk, None, &op).await.unwrap();
        let author = Actor::user(AUTHOR);

        let article = f
            .service
            .create_article(
                &author,
                NewArticle {
                    title: "Title".into(),
                    content: "clean".into(),
                    tags: vec!["news".into(), "news".into()],
                    submit: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(article.status, ArticleStatus::PendingReview);
        assert_eq!(article.tags, vec!["news".to_string()]);

        let patch = ArticlePatch {
            content: Some("now with 暴力".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update_article(article.id, patch, &author).await,
            Err(ArticleError::ModerationRejected(_))
        ));

        assert!(matches!(
            f.service
                .create_article(&Actor::system(), NewArticle::default())
                .await,
            Err(ArticleError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_status_counts_include_zeroes() {
        let f = fixture();
        draft(&f, "a", "a").await;
        draft(&f, "b", "b").await;

        let counts = f.service.status_counts().await.unwrap();
        assert_eq!(counts.len(), ArticleStatus::ALL.len());
        assert_eq!(counts[0], (ArticleStatus::Draft, 2));
        assert_eq!(counts[3], (ArticleStatus::Published, 0));
    }
}
