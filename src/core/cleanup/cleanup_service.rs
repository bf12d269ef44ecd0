// Cleanup scheduler - removes articles that have gone stale.
//
// A run holds the `article_cleanup` advisory lock from start to finish, so
// two runs (two workers, or a manual trigger racing the scheduled one) can
// never delete the same batch twice. The lock is renewed before each article;
// a run that finds it taken over stops and fails its log. Every run that gets
// the lock leaves a CleanupLog row in a terminal state and one `cleanup.run`
// audit entry.

use super::cleanup_models::{
    summarize_failures, CleanupFailure, CleanupLog, CleanupLogFilter, CleanupLogPage,
    CleanupResult, CleanupSettings, CleanupStatistics, CleanupStatus, CleanupType,
    DeletedArticleSnapshot, NewCleanupLog, CLEANUP_LOCK_NAME, MAX_THRESHOLD_DAYS,
};
use crate::core::access::{Actor, Capability, PermissionChecker};
use crate::core::articles::{AgeBasis, Article, ArticleError, ArticleStatus, ArticleStore};
use crate::core::audit::{AuditAction, AuditEvent, AuditLogger, ResourceType};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("A cleanup run is already in progress")]
    AlreadyRunning,

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<ArticleError> for CleanupError {
    fn from(e: ArticleError) -> Self {
        CleanupError::StorageError(e.to_string())
    }
}

// ============================================================================
// PORTS
// ============================================================================

#[async_trait]
pub trait CleanupStore: Send + Sync {
    async fn load_settings(&self) -> Result<Option<CleanupSettings>, CleanupError>;

    async fn save_settings(&self, settings: &CleanupSettings) -> Result<(), CleanupError>;

    /// Insert a `running` log row.
    async fn open_log(&self, new: NewCleanupLog) -> Result<CleanupLog, CleanupError>;

    /// Persist the terminal state of `log`.
    async fn close_log(&self, log: &CleanupLog) -> Result<(), CleanupError>;

    async fn get_log(&self, id: i64) -> Result<Option<CleanupLog>, CleanupError>;

    /// Logs matching the filter (paged, newest first) and the unpaged total.
    async fn list_logs(
        &self,
        filter: &CleanupLogFilter,
    ) -> Result<(Vec<CleanupLog>, u64), CleanupError>;

    /// Every log started at or after `since`.
    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<CleanupLog>, CleanupError>;

    /// Take the named lock for `holder`. `false` if someone else holds it.
    ///
    /// A lock older than its TTL is considered abandoned and may be taken over.
    async fn try_acquire_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError>;

    /// Restart the TTL of a lock `holder` still holds. `false` if it lost the lock.
    async fn renew_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError>;

    /// Release the lock if `holder` still holds it.
    async fn release_lock(&self, name: &str, holder: &str) -> Result<(), CleanupError>;
}

/// Removes an article's copies in whatever mirrors it (a search index, a
/// CDN, a companion CMS). Failures are logged and never stop a cleanup.
#[async_trait]
pub trait MirrorSync: Send + Sync {
    /// Returns the number of mirrored copies removed.
    async fn remove_mirrors(
        &self,
        article: &Article,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct CleanupScheduler {
    store: Arc<dyn CleanupStore>,
    articles: Arc<dyn ArticleStore>,
    mirrors: Arc<dyn MirrorSync>,
    permissions: Arc<dyn PermissionChecker>,
    audit: Arc<AuditLogger>,
}

/// Why a run stopped before going through every article.
struct Abort(String);

impl CleanupScheduler {
    pub fn new(
        store: Arc<dyn CleanupStore>,
        articles: Arc<dyn ArticleStore>,
        mirrors: Arc<dyn MirrorSync>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            articles,
            mirrors,
            permissions,
            audit,
        }
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub async fn settings(&self) -> Result<CleanupSettings, CleanupError> {
        Ok(self.store.load_settings().await?.unwrap_or_default())
    }

    pub async fn is_auto_cleanup_enabled(&self) -> Result<bool, CleanupError> {
        Ok(self.settings().await?.auto_enabled)
    }

    pub async fn set_threshold_days(
        &self,
        days: u32,
        operator: &Actor,
    ) -> Result<CleanupSettings, CleanupError> {
        check_threshold(days)?;
        self.update_settings(operator, |s| s.threshold_days = days)
            .await
    }

    pub async fn enable(&self, operator: &Actor) -> Result<CleanupSettings, CleanupError> {
        self.update_settings(operator, |s| s.auto_enabled = true).await
    }

    pub async fn disable(&self, operator: &Actor) -> Result<CleanupSettings, CleanupError> {
        self.update_settings(operator, |s| s.auto_enabled = false).await
    }

    pub async fn set_eligible_statuses(
        &self,
        statuses: Vec<ArticleStatus>,
        operator: &Actor,
    ) -> Result<CleanupSettings, CleanupError> {
        if statuses.is_empty() {
            return Err(CleanupError::ValidationError(
                "at least one eligible status is required".to_string(),
            ));
        }
        if statuses
            .iter()
            .any(|s| matches!(s, ArticleStatus::Draft | ArticleStatus::PendingReview))
        {
            return Err(CleanupError::ValidationError(
                "drafts and pending submissions are never cleaned up".to_string(),
            ));
        }
        let mut deduped: Vec<ArticleStatus> = Vec::with_capacity(statuses.len());
        for status in statuses {
            if !deduped.contains(&status) {
                deduped.push(status);
            }
        }
        self.update_settings(operator, move |s| s.eligible_statuses = deduped)
            .await
    }

    pub async fn set_age_basis(
        &self,
        basis: AgeBasis,
        operator: &Actor,
    ) -> Result<CleanupSettings, CleanupError> {
        self.update_settings(operator, |s| s.age_basis = basis).await
    }

    async fn update_settings(
        &self,
        operator: &Actor,
        change: impl FnOnce(&mut CleanupSettings),
    ) -> Result<CleanupSettings, CleanupError> {
        self.require(operator, Capability::ManageSettings).await?;

        let old = self.settings().await?;
        let mut settings = old.clone();
        change(&mut settings);
        if settings == old {
            return Ok(settings);
        }
        self.store.save_settings(&settings).await?;

        tracing::info!(
            threshold_days = settings.threshold_days,
            auto_enabled = settings.auto_enabled,
            age_basis = settings.age_basis.as_str(),
            "Cleanup settings changed"
        );
        let event = AuditEvent::new(AuditAction::CleanupSettingsChange)
            .on(ResourceType::Cleanup, None)
            .old_values(settings_snapshot(&old))
            .new_values(settings_snapshot(&settings));
        self.audit.record(operator, event).await;

        Ok(settings)
    }

    // ------------------------------------------------------------------------
    // Identification
    // ------------------------------------------------------------------------

    /// Ids of eligible articles older than `threshold_days` (default: the
    /// configured threshold).
    pub async fn identify_articles_for_cleanup(
        &self,
        threshold_days: Option<u32>,
    ) -> Result<Vec<i64>, CleanupError> {
        self.identify_articles_for_cleanup_at(threshold_days, Utc::now())
            .await
    }

    /// Like [`identify_articles_for_cleanup`](Self::identify_articles_for_cleanup)
    /// with an explicit "now".
    pub async fn identify_articles_for_cleanup_at(
        &self,
        threshold_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, CleanupError> {
        let settings = self.settings().await?;
        let threshold = resolve_threshold(threshold_days, &settings)?;
        let cutoff = days_before(now, threshold)?;
        Ok(self
            .articles
            .find_stale(&settings.eligible_statuses, settings.age_basis, cutoff)
            .await?)
    }

    // ------------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------------

    /// Delete `article_ids` as one logged run.
    ///
    /// Returns `AlreadyRunning` without touching anything if another run
    /// holds the lock. An empty id list still produces a completed log.
    pub async fn execute_cleanup(
        &self,
        article_ids: &[i64],
        triggered_by: Option<&Actor>,
        cleanup_type: CleanupType,
    ) -> Result<CleanupResult, CleanupError> {
        let threshold = self.settings().await?.threshold_days;
        self.run(article_ids, triggered_by, cleanup_type, threshold)
            .await
    }

    /// Identify and delete stale articles now, on behalf of `actor`.
    pub async fn trigger_manual_cleanup(
        &self,
        actor: &Actor,
        threshold_days: Option<u32>,
    ) -> Result<CleanupResult, CleanupError> {
        self.require(actor, Capability::RunCleanup).await?;

        let settings = self.settings().await?;
        let threshold = resolve_threshold(threshold_days, &settings)?;
        let ids = self.identify_articles_for_cleanup(Some(threshold)).await?;

        tracing::info!(
            actor = ?actor.user_id,
            threshold_days = threshold,
            candidates = ids.len(),
            "Manual cleanup triggered"
        );
        self.run(&ids, Some(actor), CleanupType::Manual, threshold)
            .await
    }

    /// The scheduled entry point. `Ok(None)` when auto cleanup is disabled
    /// or another run holds the lock.
    pub async fn run_auto_cleanup(&self) -> Result<Option<CleanupResult>, CleanupError> {
        let settings = self.settings().await?;
        if !settings.auto_enabled {
            tracing::debug!("Auto cleanup disabled, skipping");
            return Ok(None);
        }

        let ids = self
            .identify_articles_for_cleanup(Some(settings.threshold_days))
            .await?;
        match self
            .run(&ids, None, CleanupType::Auto, settings.threshold_days)
            .await
        {
            Ok(result) => Ok(Some(result)),
            Err(CleanupError::AlreadyRunning) => {
                tracing::info!("Auto cleanup skipped, another run is in progress");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn run(
        &self,
        article_ids: &[i64],
        triggered_by: Option<&Actor>,
        cleanup_type: CleanupType,
        threshold_days: u32,
    ) -> Result<CleanupResult, CleanupError> {
        let holder = format!("{}-{:016x}", cleanup_type, rand::random::<u64>());
        if !self
            .store
            .try_acquire_lock(CLEANUP_LOCK_NAME, &holder)
            .await?
        {
            tracing::warn!(cleanup_type = %cleanup_type, "Cleanup already running");
            return Err(CleanupError::AlreadyRunning);
        }

        let outcome = self
            .run_locked(article_ids, &holder, triggered_by, cleanup_type, threshold_days)
            .await;

        if let Err(e) = self.store.release_lock(CLEANUP_LOCK_NAME, &holder).await {
            tracing::error!(error = %e, "Failed to release cleanup lock");
        }

        outcome
    }

    async fn run_locked(
        &self,
        article_ids: &[i64],
        holder: &str,
        triggered_by: Option<&Actor>,
        cleanup_type: CleanupType,
        threshold_days: u32,
    ) -> Result<CleanupResult, CleanupError> {
        let settings = self.settings().await?;
        let actor = triggered_by.cloned().unwrap_or_else(Actor::system);

        let mut log = self
            .store
            .open_log(NewCleanupLog {
                cleanup_type,
                triggered_by: actor.user_id,
                threshold_days,
                started_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            log_id = log.id,
            cleanup_type = %cleanup_type,
            candidates = article_ids.len(),
            "Cleanup run started"
        );

        let mut deleted: Vec<DeletedArticleSnapshot> = Vec::new();
        let mut failures: Vec<CleanupFailure> = Vec::new();
        let mut abort: Option<Abort> = None;

        for &id in article_ids {
            match self.store.renew_lock(CLEANUP_LOCK_NAME, holder).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!(holder, "Cleanup lock taken over, stopping run");
                    abort = Some(Abort("cleanup lock was lost".to_string()));
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Could not renew cleanup lock");
                    abort = Some(Abort(e.to_string()));
                    break;
                }
            }

            match self.remove_one(id, &settings).await {
                Ok(snapshot) => deleted.push(snapshot),
                Err(Ok(failure)) => {
                    tracing::warn!(
                        article_id = id,
                        error = %failure.error,
                        "Article not cleaned up"
                    );
                    failures.push(failure);
                }
                Err(Err(fatal)) => {
                    tracing::error!(article_id = id, error = %fatal.0, "Cleanup run aborted");
                    abort = Some(fatal);
                    break;
                }
            }
        }

        log.completed_at = Some(Utc::now());
        log.articles_deleted = deleted.len() as u64;
        log.deleted_articles = deleted.clone();
        match &abort {
            Some(Abort(reason)) => {
                log.status = CleanupStatus::Failed;
                let mut message = reason.clone();
                if let Some(summary) = summarize_failures(&failures) {
                    message = format!("{}; {}", message, summary);
                }
                log.error_message = Some(message);
            }
            None => {
                log.status = CleanupStatus::Completed;
                log.error_message = summarize_failures(&failures);
            }
        }

        if let Err(e) = self.store.close_log(&log).await {
            tracing::error!(log_id = log.id, error = %e, "Failed to close cleanup log");
            return Err(e);
        }

        tracing::info!(
            log_id = log.id,
            status = %log.status,
            deleted = log.articles_deleted,
            failed = failures.len(),
            "Cleanup run finished"
        );

        if let Err(e) = self
            .audit
            .log_cleanup_operation(
                &actor,
                Some(log.id),
                cleanup_type.as_str(),
                log.articles_deleted,
                Some(json!({
                    "status": log.status.as_str(),
                    "threshold_days": threshold_days,
                    "deleted_ids": deleted.iter().map(|a| a.id).collect::<Vec<_>>(),
                    "failed_ids": failures.iter().map(|f| f.article_id).collect::<Vec<_>>(),
                })),
            )
            .await
        {
            tracing::warn!(log_id = log.id, error = %e, "Cleanup run not audited");
        }

        Ok(CleanupResult {
            log_id: log.id,
            status: log.status,
            articles_deleted: log.articles_deleted,
            deleted_articles: deleted,
            failures,
        })
    }

    /// Delete one article. `Err(Ok(_))` is a per-article failure the run
    /// records and moves past; `Err(Err(_))` stops the run.
    async fn remove_one(
        &self,
        id: i64,
        settings: &CleanupSettings,
    ) -> Result<DeletedArticleSnapshot, Result<CleanupFailure, Abort>> {
        let failure = |error: String| -> Result<CleanupFailure, Abort> {
            Ok(CleanupFailure {
                article_id: id,
                error,
            })
        };

        let article = match self.articles.get(id).await {
            Ok(Some(article)) => article,
            Ok(None) => return Err(failure("article no longer exists".to_string())),
            Err(ArticleError::StorageError(e)) => return Err(Err(Abort(e))),
            Err(e) => return Err(failure(e.to_string())),
        };

        if !settings.eligible_statuses.contains(&article.status) {
            return Err(failure(format!(
                "status {} is not eligible for cleanup",
                article.status
            )));
        }

        match self.mirrors.remove_mirrors(&article).await {
            Ok(removed) if removed > 0 => {
                tracing::debug!(article_id = id, removed, "Removed mirrored copies");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(article_id = id, error = %e, "Mirror sync failed, deleting anyway");
            }
        }

        match self.articles.delete(id, article.version).await {
            Ok(()) => Ok(DeletedArticleSnapshot::from(&article)),
            Err(ArticleError::StorageError(e)) => Err(Err(Abort(e))),
            Err(e) => Err(failure(e.to_string())),
        }
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    pub async fn cleanup_logs(
        &self,
        filter: &CleanupLogFilter,
    ) -> Result<CleanupLogPage, CleanupError> {
        let (logs, total) = self.store.list_logs(filter).await?;
        Ok(CleanupLogPage {
            logs,
            total,
            page: filter.page.max(1),
            per_page: filter.per_page,
        })
    }

    pub async fn get_log(&self, id: i64) -> Result<Option<CleanupLog>, CleanupError> {
        self.store.get_log(id).await
    }

    /// Totals over the last `period_days` days.
    pub async fn cleanup_statistics(
        &self,
        period_days: u32,
    ) -> Result<CleanupStatistics, CleanupError> {
        if period_days == 0 || period_days > MAX_THRESHOLD_DAYS {
            return Err(CleanupError::ValidationError(format!(
                "period_days must be between 1 and {}",
                MAX_THRESHOLD_DAYS
            )));
        }
        let since = days_before(Utc::now(), period_days)?;
        let logs = self.store.logs_since(since).await?;
        Ok(CleanupStatistics::tally(period_days, &logs))
    }

    async fn require(&self, actor: &Actor, capability: Capability) -> Result<(), CleanupError> {
        if self.permissions.has_capability(actor, capability).await {
            Ok(())
        } else {
            Err(CleanupError::PermissionDenied)
        }
    }
}

fn check_threshold(days: u32) -> Result<u32, CleanupError> {
    if days == 0 || days > MAX_THRESHOLD_DAYS {
        return Err(CleanupError::ValidationError(format!(
            "threshold_days must be between 1 and {}",
            MAX_THRESHOLD_DAYS
        )));
    }
    Ok(days)
}

/// An explicit threshold wins over the stored one. Both are range-checked,
/// since the stored settings may predate the bound.
fn resolve_threshold(
    threshold_days: Option<u32>,
    settings: &CleanupSettings,
) -> Result<u32, CleanupError> {
    check_threshold(threshold_days.unwrap_or(settings.threshold_days))
}

fn days_before(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, CleanupError> {
    Duration::try_days(days as i64)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| {
            CleanupError::ValidationError(format!("{} days reaches past the calendar", days))
        })
}

fn settings_snapshot(settings: &CleanupSettings) -> serde_json::Value {
    json!({
        "threshold_days": settings.threshold_days,
        "auto_enabled": settings.auto_enabled,
        "eligible_statuses": settings
            .eligible_statuses
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>(),
        "age_basis": settings.age_basis.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::articles::ArticleDraft;
    use crate::core::cleanup::LOCK_TTL_SECS;
    use crate::core::audit::AuditFilter;
    use crate::infra::articles::InMemoryArticleStore;
    use crate::infra::audit::InMemoryAuditStore;
    use crate::infra::cleanup::{InMemoryCleanupStore, NoopMirrorSync};
    use crate::infra::permissions::StaticPermissions;
    use std::sync::Mutex;
    use tokio::sync::{oneshot, Notify};

    const ADMIN: i64 = 1;

    /// Mirror double that parks the first call until released.
    struct GatedMirror {
        entered: Mutex<Option<oneshot::Sender<()>>>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl MirrorSync for GatedMirror {
        async fn remove_mirrors(
            &self,
            _article: &Article,
        ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
            let entered = self.entered.lock().unwrap().take();
            if let Some(tx) = entered {
                let _ = tx.send(());
                self.release.notified().await;
            }
            Ok(0)
        }
    }

    struct FailingMirror;

    #[async_trait]
    impl MirrorSync for FailingMirror {
        async fn remove_mirrors(
            &self,
            _article: &Article,
        ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
            Err("mirror offline".into())
        }
    }

    struct Fixture {
        scheduler: Arc<CleanupScheduler>,
        articles: Arc<InMemoryArticleStore>,
        store: Arc<InMemoryCleanupStore>,
        audit: Arc<AuditLogger>,
    }

    fn fixture_with_mirror(mirrors: Arc<dyn MirrorSync>) -> Fixture {
        let permissions = Arc::new(StaticPermissions::moderators([ADMIN]));
        let audit = Arc::new(AuditLogger::new(
            Arc::new(InMemoryAuditStore::new()),
            permissions.clone(),
        ));
        let articles = Arc::new(InMemoryArticleStore::new());
        let store = Arc::new(InMemoryCleanupStore::new());
        let scheduler = Arc::new(CleanupScheduler::new(
            store.clone(),
            articles.clone(),
            mirrors,
            permissions,
            audit.clone(),
        ));
        Fixture {
            scheduler,
            articles,
            store,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_mirror(Arc::new(NoopMirrorSync))
    }

    async fn cleanup_audits(f: &Fixture) -> Vec<crate::core::audit::AuditLogEntry> {
        let filter = AuditFilter {
            action: Some("cleanup.run".to_string()),
            ..Default::default()
        };
        f.audit
            .get_logs(&Actor::user(ADMIN), &filter, 1, 50)
            .await
            .unwrap()
            .logs
    }

    async fn seed(f: &Fixture, status: ArticleStatus, age_days: i64) -> Article {
        f.articles
            .insert(ArticleDraft {
                title: format!("{} {}d", status, age_days),
                content: "body".to_string(),
                excerpt: String::new(),
                author_id: 7,
                status,
                tags: vec![],
                created_at: Utc::now() - Duration::days(age_days),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identify_uses_threshold_and_status() {
        let f = fixture();
        let old_published = seed(&f, ArticleStatus::Published, 31).await;
        let _young_published = seed(&f, ArticleStatus::Published, 29).await;
        let _old_draft = seed(&f, ArticleStatus::Draft, 90).await;
        let old_rejected = seed(&f, ArticleStatus::Rejected, 45).await;

        let ids = f
            .scheduler
            .identify_articles_for_cleanup(Some(30))
            .await
            .unwrap();

        assert_eq!(ids, vec![old_rejected.id, old_published.id]);
    }

    #[tokio::test]
    async fn test_identify_is_monotone_in_threshold() {
        let f = fixture();
        for age in [5, 15, 25, 35, 45] {
            seed(&f, ArticleStatus::Archived, age).await;
        }
        let now = Utc::now();
        let mut previous: Option<Vec<i64>> = None;
        for threshold in [40, 30, 20, 10, 1] {
            let ids = f
                .scheduler
                .identify_articles_for_cleanup_at(Some(threshold), now)
                .await
                .unwrap();
            if let Some(prev) = &previous {
                assert!(prev.iter().all(|id| ids.contains(id)));
            }
            previous = Some(ids);
        }
    }

    #[tokio::test]
    async fn test_execute_cleanup_deletes_and_logs() {
        let f = fixture();
        let a = seed(&f, ArticleStatus::Published, 40).await;
        let b = seed(&f, ArticleStatus::Archived, 40).await;

        let result = f
            .scheduler
            .execute_cleanup(&[a.id, b.id, 404], Some(&Actor::user(ADMIN)), CleanupType::Manual)
            .await
            .unwrap();

        assert_eq!(result.status, CleanupStatus::Completed);
        assert_eq!(result.articles_deleted, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(f.articles.get(a.id).await.unwrap().is_none());

        let log = f.scheduler.get_log(result.log_id).await.unwrap().unwrap();
        assert_eq!(log.status, CleanupStatus::Completed);
        assert!(log.completed_at.is_some());
        assert_eq!(log.triggered_by, Some(ADMIN));
        assert_eq!(log.deleted_articles.len(), 2);
        assert_eq!(
            log.error_message.as_deref(),
            Some("ID 404: article no longer exists")
        );

        let entries = cleanup_audits(&f).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_id, Some(result.log_id));
    }

    #[tokio::test]
    async fn test_cleanup_skips_articles_that_became_ineligible() {
        let f = fixture();
        let a = seed(&f, ArticleStatus::Published, 40).await;
        let mut revived = a.clone();
        revived.status = ArticleStatus::Draft;
        f.articles.put(revived);

        let result = f
            .scheduler
            .execute_cleanup(&[a.id], None, CleanupType::Auto)
            .await
            .unwrap();

        assert_eq!(result.articles_deleted, 0);
        assert_eq!(result.failures.len(), 1);
        assert!(f.articles.get(a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_run_still_completes_a_log() {
        let f = fixture();
        let result = f
            .scheduler
            .execute_cleanup(&[], None, CleanupType::Auto)
            .await
            .unwrap();

        assert_eq!(result.articles_deleted, 0);
        let log = f.scheduler.get_log(result.log_id).await.unwrap().unwrap();
        assert_eq!(log.status, CleanupStatus::Completed);
        assert_eq!(log.triggered_by, None);
    }

    #[tokio::test]
    async fn test_mirror_failures_do_not_block_deletion() {
        let f = fixture_with_mirror(Arc::new(FailingMirror));
        let a = seed(&f, ArticleStatus::Published, 40).await;

        let result = f
            .scheduler
            .execute_cleanup(&[a.id], None, CleanupType::Auto)
            .await
            .unwrap();

        assert_eq!(result.articles_deleted, 1);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_refused() {
        let (tx, rx) = oneshot::channel();
        let release = Arc::new(Notify::new());
        let f = fixture_with_mirror(Arc::new(GatedMirror {
            entered: Mutex::new(Some(tx)),
            release: release.clone(),
        }));
        let id = seed(&f, ArticleStatus::Published, 40).await.id;

        let first = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .execute_cleanup(&[id], None, CleanupType::Auto)
                    .await
            })
        };

        // Wait until the first run is inside its critical section.
        rx.await.unwrap();

        let second = f
            .scheduler
            .execute_cleanup(&[id], Some(&Actor::user(ADMIN)), CleanupType::Manual)
            .await;
        assert!(matches!(second, Err(CleanupError::AlreadyRunning)));

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.articles_deleted, 1);

        // Only the first run left a log.
        let page = f
            .scheduler
            .cleanup_logs(&CleanupLogFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        // The lock is free again.
        let third = f
            .scheduler
            .execute_cleanup(&[], None, CleanupType::Auto)
            .await
            .unwrap();
        assert_eq!(third.status, CleanupStatus::Completed);
    }

    #[tokio::test]
    async fn test_held_lock_refuses_run() {
        let f = fixture();
        assert!(f
            .store
            .try_acquire_lock(CLEANUP_LOCK_NAME, "other-worker")
            .await
            .unwrap());

        let result = f
            .scheduler
            .execute_cleanup(&[], None, CleanupType::Auto)
            .await;
        assert!(matches!(result, Err(CleanupError::AlreadyRunning)));

        f.store
            .release_lock(CLEANUP_LOCK_NAME, "other-worker")
            .await
            .unwrap();
        assert!(f
            .scheduler
            .execute_cleanup(&[], None, CleanupType::Auto)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_auto_cleanup_respects_toggle() {
        let f = fixture();
        seed(&f, ArticleStatus::Published, 40).await;

        assert!(f.scheduler.run_auto_cleanup().await.unwrap().is_none());

        f.scheduler.enable(&Actor::user(ADMIN)).await.unwrap();
        let result = f.scheduler.run_auto_cleanup().await.unwrap().unwrap();
        assert_eq!(result.articles_deleted, 1);

        let stats = f.scheduler.cleanup_statistics(7).await.unwrap();
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.articles_deleted, 1);
    }

    #[tokio::test]
    async fn test_manual_cleanup_needs_capability() {
        let f = fixture();
        seed(&f, ArticleStatus::Published, 40).await;

        assert!(matches!(
            f.scheduler.trigger_manual_cleanup(&Actor::user(50), None).await,
            Err(CleanupError::PermissionDenied)
        ));

        let result = f
            .scheduler
            .trigger_manual_cleanup(&Actor::user(ADMIN), Some(35))
            .await
            .unwrap();
        assert_eq!(result.articles_deleted, 1);
        let log = f.scheduler.get_log(result.log_id).await.unwrap().unwrap();
        assert_eq!(log.threshold_days, 35);
        assert_eq!(log.cleanup_type, CleanupType::Manual);
    }

    #[tokio::test]
    async fn test_settings_validation() {
        let f = fixture();
        let admin = Actor::user(ADMIN);

        assert!(matches!(
            f.scheduler.set_threshold_days(0, &admin).await,
            Err(CleanupError::ValidationError(_))
        ));
        assert!(matches!(
            f.scheduler
                .set_eligible_statuses(vec![ArticleStatus::Draft], &admin)
                .await,
            Err(CleanupError::ValidationError(_))
        ));
        assert!(matches!(
            f.scheduler.set_threshold_days(10, &Actor::user(2)).await,
            Err(CleanupError::PermissionDenied)
        ));

        let settings = f.scheduler.set_threshold_days(10, &admin).await.unwrap();
        assert_eq!(settings.threshold_days, 10);
        let settings = f
            .scheduler
            .set_age_basis(AgeBasis::UpdatedAt, &admin)
            .await
            .unwrap();
        assert_eq!(settings.age_basis, AgeBasis::UpdatedAt);
        assert_eq!(f.scheduler.settings().await.unwrap().threshold_days, 10);
    }

    #[tokio::test]
    async fn test_oversized_thresholds_are_rejected() {
        let f = fixture();
        let admin = Actor::user(ADMIN);
        seed(&f, ArticleStatus::Published, 40).await;

        assert!(matches!(
            f.scheduler.set_threshold_days(1_000_000_000, &admin).await,
            Err(CleanupError::ValidationError(_))
        ));
        assert_eq!(f.scheduler.settings().await.unwrap().threshold_days, 30);

        assert!(matches!(
            f.scheduler
                .identify_articles_for_cleanup(Some(1_000_000_000))
                .await,
            Err(CleanupError::ValidationError(_))
        ));
        assert!(matches!(
            f.scheduler.trigger_manual_cleanup(&admin, Some(u32::MAX)).await,
            Err(CleanupError::ValidationError(_))
        ));
        assert!(matches!(
            f.scheduler.cleanup_statistics(u32::MAX).await,
            Err(CleanupError::ValidationError(_))
        ));

        // The largest accepted threshold still works.
        assert!(f
            .scheduler
            .identify_articles_for_cleanup(Some(MAX_THRESHOLD_DAYS))
            .await
            .unwrap()
            .is_empty());
        let page = f
            .scheduler
            .cleanup_logs(&CleanupLogFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_stored_threshold_fails_the_tick() {
        let f = fixture();
        let old = seed(&f, ArticleStatus::Published, 40).await;
        f.store
            .save_settings(&CleanupSettings {
                threshold_days: u32::MAX,
                auto_enabled: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(matches!(
            f.scheduler.run_auto_cleanup().await,
            Err(CleanupError::ValidationError(_))
        ));
        assert!(f.articles.get(old.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeated_cleanup_is_idempotent() {
        let f = fixture();
        seed(&f, ArticleStatus::Published, 40).await;
        seed(&f, ArticleStatus::Archived, 60).await;
        let admin = Actor::user(ADMIN);

        let ids = f.scheduler.identify_articles_for_cleanup(None).await.unwrap();
        let first = f
            .scheduler
            .execute_cleanup(&ids, Some(&admin), CleanupType::Manual)
            .await
            .unwrap();
        assert_eq!(first.articles_deleted, 2);

        let ids = f.scheduler.identify_articles_for_cleanup(None).await.unwrap();
        assert!(ids.is_empty());
        let second = f
            .scheduler
            .execute_cleanup(&ids, Some(&admin), CleanupType::Manual)
            .await
            .unwrap();
        assert_eq!(second.articles_deleted, 0);
        assert_eq!(second.status, CleanupStatus::Completed);
        assert_ne!(second.log_id, first.log_id);

        let page = f
            .scheduler
            .cleanup_logs(&CleanupLogFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .logs
            .iter()
            .all(|l| l.status == CleanupStatus::Completed));

        // One audit entry per call.
        assert_eq!(cleanup_audits(&f).await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_lock_is_taken_over() {
        let (tx, rx) = oneshot::channel();
        let release = Arc::new(Notify::new());
        let f = fixture_with_mirror(Arc::new(GatedMirror {
            entered: Mutex::new(Some(tx)),
            release: release.clone(),
        }));
        let a = seed(&f, ArticleStatus::Published, 40).await;
        let b = seed(&f, ArticleStatus::Published, 41).await;

        let run = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .execute_cleanup(&[a.id, b.id], None, CleanupType::Auto)
                    .await
            })
        };

        // The run stalls past its TTL and another worker takes the lock.
        rx.await.unwrap();
        f.store
            .age_lock(CLEANUP_LOCK_NAME, Duration::seconds(LOCK_TTL_SECS + 60));
        assert!(f
            .store
            .try_acquire_lock(CLEANUP_LOCK_NAME, "other-worker")
            .await
            .unwrap());
        release.notify_one();

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.status, CleanupStatus::Failed);
        assert_eq!(result.articles_deleted, 1);
        assert!(f.articles.get(b.id).await.unwrap().is_some());

        let log = f.scheduler.get_log(result.log_id).await.unwrap().unwrap();
        assert!(log
            .error_message
            .unwrap()
            .contains("cleanup lock was lost"));

        // The new holder keeps its lock.
        assert!(!f
            .store
            .try_acquire_lock(CLEANUP_LOCK_NAME, "third-worker")
            .await
            .unwrap());
    }
}
