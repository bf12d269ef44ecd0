// Entry point of the moderation service.
//
// **Architecture Overview:**
// - `core/` = Business logic (storage-agnostic)
// - `infra/` = Implementations of core traits (SQLite, DeepSeek, permissions)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the periodic background jobs
// 4. Run until Ctrl-C

use article_moderation::config::AppConfig;
use article_moderation::core::articles::{ArticleService, TransitionPolicy};
use article_moderation::core::audit::AuditLogger;
use article_moderation::core::cleanup::CleanupScheduler;
use article_moderation::core::moderation::ModerationEngine;
use article_moderation::core::words::SensitiveWordService;
use article_moderation::infra::articles::SqliteArticleStore;
use article_moderation::infra::audit::SqliteAuditStore;
use article_moderation::infra::classifier::DeepSeekClassifier;
use article_moderation::infra::cleanup::{NoopMirrorSync, SqliteCleanupStore};
use article_moderation::infra::moderation::SqliteSettingsStore;
use article_moderation::infra::permissions::StaticPermissions;
use article_moderation::infra::sqlite_support;
use article_moderation::infra::words::SqliteWordStore;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::sleep;

/// How often expired audit entries are purged.
const AUDIT_RETENTION_INTERVAL: StdDuration = StdDuration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;

    // ========================================================================
    // STORAGE
    // ========================================================================

    let pool = sqlite_support::connect(&config.database_url).await?;

    let audit_store = SqliteAuditStore::new(pool.clone());
    audit_store.migrate().await?;
    let word_store = SqliteWordStore::new(pool.clone());
    word_store.migrate().await?;
    let settings_store = SqliteSettingsStore::new(pool.clone());
    settings_store.migrate().await?;
    let article_store = SqliteArticleStore::new(pool.clone());
    article_store.migrate().await?;
    let cleanup_store = SqliteCleanupStore::new(pool.clone());
    cleanup_store.migrate().await?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let permissions = Arc::new(StaticPermissions::moderators(
        config.moderator_ids.iter().copied(),
    ));
    let audit = Arc::new(AuditLogger::new(Arc::new(audit_store), permissions.clone()));

    let words = Arc::new(SensitiveWordService::new(
        Arc::new(word_store),
        permissions.clone(),
        Arc::clone(&audit),
    ));
    if config.seed_builtin_words {
        words.initialize_builtin_words().await?;
    }

    let mut engine = ModerationEngine::new(
        Arc::clone(&words),
        Arc::new(settings_store),
        permissions.clone(),
        Arc::clone(&audit),
    );
    if let Some(classifier) = &config.classifier {
        let client = DeepSeekClassifier::new(classifier.api_key.clone())
            .with_base_url(classifier.base_url.clone())
            .with_model(classifier.model.clone());
        engine = engine.with_classifier(Arc::new(client), classifier.policy);
        tracing::info!(model = %classifier.model, "External classifier enabled");
    } else {
        tracing::info!("No DEEPSEEK_API_KEY set, moderating with the local dictionary only");
    }
    let engine = Arc::new(engine);

    let article_store = Arc::new(article_store);
    let articles = Arc::new(ArticleService::new(
        article_store.clone(),
        Arc::clone(&engine),
        permissions.clone(),
        Arc::clone(&audit),
        TransitionPolicy {
            allow_direct_publish: config.allow_direct_publish,
        },
    ));

    let cleanup = Arc::new(CleanupScheduler::new(
        Arc::new(cleanup_store),
        article_store,
        Arc::new(NoopMirrorSync),
        permissions,
        Arc::clone(&audit),
    ));

    let level = engine.current_level().await;
    let counts = articles.status_counts().await?;
    tracing::info!(
        level = %level,
        moderators = config.moderator_ids.len(),
        articles = ?counts,
        "Moderation service ready"
    );

    // ========================================================================
    // BACKGROUND JOBS
    // ========================================================================

    // Auto cleanup. The scheduler itself checks whether it is enabled, so
    // toggling the setting takes effect on the next tick.
    let cleanup_interval = config.cleanup_interval;
    let cleanup_job = Arc::clone(&cleanup);
    tokio::spawn(async move {
        loop {
            sleep(cleanup_interval).await;
            match cleanup_job.run_auto_cleanup().await {
                Ok(Some(result)) => tracing::info!(
                    log_id = result.log_id,
                    deleted = result.articles_deleted,
                    failures = result.failures.len(),
                    "Auto cleanup finished"
                ),
                Ok(None) => {}
                Err(e) => tracing::error!("Auto cleanup failed: {}", e),
            }
        }
    });

    // Audit retention.
    let retention_days = config.audit_retention_days;
    let retention_audit = Arc::clone(&audit);
    tokio::spawn(async move {
        loop {
            if let Err(e) = retention_audit.cleanup_old_logs(retention_days).await {
                tracing::error!("Audit retention purge failed: {}", e);
            }
            sleep(AUDIT_RETENTION_INTERVAL).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    pool.close().await;
    Ok(())
}
