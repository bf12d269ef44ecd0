// Moderation engine - decides whether a text may be submitted.
//
// Two stages:
// - Local: scan against the sensitive-word dictionary using the level's
//   strategy (block, mask, or pass).
// - External (optional): ask a content classifier, with a timeout and
//   retries. Any classifier failure falls back to the local verdict.
//
// The engine always produces a verdict. Nothing past this boundary sees a
// classifier or dictionary error.

use super::moderation_models::{
    ArticleModeration, BatchModeration, BatchSummary, ClassifierOptions, ClassifierPolicy,
    ClassifierVerdict, Disposition, ModerationLevel, ModerationRules, ModerationSettings,
    ModerationVerdict, RiskLevel,
};
use crate::core::access::{Actor, Capability, PermissionChecker};
use crate::core::audit::{AuditAction, AuditEvent, AuditLogger, ResourceType};
use crate::core::words::{contains_term, SensitiveWordService, WordMatch, WordType};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Failure of a single classifier call.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Worth retrying: network failure, timeout, 429, 5xx.
    #[error("Transient classifier error: {0}")]
    Transient(String),

    /// Retrying will not help: auth failure, bad request.
    #[error("Classifier rejected the request: {0}")]
    Permanent(String),

    /// The classifier answered with something we could not read.
    #[error("Malformed classifier response: {0}")]
    Malformed(String),
}

impl ClassifierError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Transient(_))
    }
}

// ============================================================================
// PORTS
// ============================================================================

/// An external content classifier. Must be idempotent for identical input.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn evaluate(
        &self,
        text: &str,
        options: &ClassifierOptions,
    ) -> Result<ClassifierVerdict, ClassifierError>;
}

#[async_trait]
pub trait ModerationSettingsStore: Send + Sync {
    /// Stored settings, or `None` if never saved.
    async fn load(&self) -> Result<Option<ModerationSettings>, ModerationError>;

    async fn save(&self, settings: &ModerationSettings) -> Result<(), ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationEngine {
    words: Arc<SensitiveWordService>,
    settings: Arc<dyn ModerationSettingsStore>,
    permissions: Arc<dyn PermissionChecker>,
    audit: Arc<AuditLogger>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    policy: ClassifierPolicy,
}

impl ModerationEngine {
    pub fn new(
        words: Arc<SensitiveWordService>,
        settings: Arc<dyn ModerationSettingsStore>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            words,
            settings,
            permissions,
            audit,
            classifier: None,
            policy: ClassifierPolicy::default(),
        }
    }

    /// Consult `classifier` after the local stage.
    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn ContentClassifier>,
        policy: ClassifierPolicy,
    ) -> Self {
        self.classifier = Some(classifier);
        self.policy = policy;
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Evaluate `text` at `level`. Runs the classifier if one is configured.
    pub async fn evaluate(&self, text: &str, level: ModerationLevel) -> ModerationVerdict {
        self.evaluate_with(text, level, true).await
    }

    async fn evaluate_with(
        &self,
        text: &str,
        level: ModerationLevel,
        use_classifier: bool,
    ) -> ModerationVerdict {
        if text.trim().is_empty() {
            return ModerationVerdict::pass(level);
        }

        let local = self.local_stage(text, level).await;
        if local.is_rejected() {
            // Nothing the classifier says can loosen a local reject.
            return local;
        }

        let classifier = match (&self.classifier, use_classifier) {
            (Some(classifier), true) => classifier.clone(),
            _ => return local,
        };

        let scanned = local.final_text(text).to_string();
        match self.external_stage(classifier.as_ref(), &scanned, level).await {
            Some(external) => merge(local, external),
            None => local,
        }
    }

    async fn local_stage(&self, text: &str, level: ModerationLevel) -> ModerationVerdict {
        let strategy = level.strategy();

        let dictionary = match self.words.dictionary().await {
            Ok(dictionary) => dictionary,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    level = %level,
                    "Word dictionary unavailable, rejecting"
                );
                let mut verdict =
                    ModerationVerdict::reject(level, "Sensitive-word dictionary unavailable");
                verdict.suggestions.push("Try again later".to_string());
                return verdict;
            }
        };

        let matches = dictionary.find_matches(text, &strategy.scanned_types());
        if matches.is_empty() {
            return ModerationVerdict::pass(level);
        }

        let flagged = distinct_terms(matches.iter());
        let high_risk = distinct_terms(
            matches
                .iter()
                .filter(|m| m.word_type == WordType::HighRisk && strategy.blocks(m.word_type)),
        );
        let normal = distinct_terms(
            matches
                .iter()
                .filter(|m| m.word_type == WordType::Normal && strategy.blocks(m.word_type)),
        );

        if !high_risk.is_empty() || !normal.is_empty() || !strategy.allow_submission {
            let mut reasons = Vec::new();
            if !high_risk.is_empty() {
                reasons.push(format!("Contains high-risk terms: {}", high_risk.join(", ")));
            }
            // A level that refuses all matches may block on terms it does not block by type.
            let sensitive = if normal.is_empty() && high_risk.is_empty() {
                &flagged
            } else {
                &normal
            };
            if !sensitive.is_empty() {
                reasons.push(format!("Contains sensitive terms: {}", sensitive.join(", ")));
            }
            return ModerationVerdict {
                reasons,
                suggestions: vec!["Remove or rephrase the flagged terms".to_string()],
                flagged_keywords: flagged,
                ..ModerationVerdict::reject(level, "")
            };
        }

        let replaced_types = strategy.replaced_types();
        if matches.iter().any(|m| replaced_types.contains(&m.word_type)) {
            let rewritten = dictionary.replace(text, &replaced_types);
            let mut verdict = ModerationVerdict::pass(level);
            verdict.disposition = Disposition::PassWithReplacement;
            verdict
                .reasons
                .push(format!("Masked sensitive terms: {}", flagged.join(", ")));
            verdict.flagged_keywords = flagged;
            verdict.text = Some(rewritten);
            return verdict;
        }

        ModerationVerdict::pass(level)
    }

    /// Ask the classifier, retrying transient failures. `None` means fall
    /// back to the local verdict.
    async fn external_stage(
        &self,
        classifier: &dyn ContentClassifier,
        text: &str,
        level: ModerationLevel,
    ) -> Option<ClassifierVerdict> {
        let options = ClassifierOptions::for_level(level);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome =
                match tokio::time::timeout(self.policy.timeout, classifier.evaluate(text, &options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ClassifierError::Transient(format!(
                        "timed out after {:?}",
                        self.policy.timeout
                    ))),
                };

            match outcome {
                Ok(verdict) => return Some(verdict),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.jittered_backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Classifier call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "Classifier unavailable, using local verdict"
                    );
                    return None;
                }
            }
        }

        None
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff(attempt);
        let spread = (base.as_millis() as u64) / 4;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    // ------------------------------------------------------------------------
    // Settings-aware entry points
    // ------------------------------------------------------------------------

    /// Moderate `text` submitted by `actor` under the current settings.
    ///
    /// Order: bypass users, whitelist, blacklist, then the dictionary and
    /// classifier stages.
    pub async fn moderate_text(&self, text: &str, actor: &Actor) -> ModerationVerdict {
        let settings = self.settings_or_default().await;
        self.moderate_with(text, actor, &settings).await
    }

    async fn moderate_with(
        &self,
        text: &str,
        actor: &Actor,
        settings: &ModerationSettings,
    ) -> ModerationVerdict {
        let level = settings.level;

        if let Some(user_id) = actor.user_id {
            if settings.bypass_users.contains(&user_id) {
                let mut verdict = ModerationVerdict::pass(level);
                verdict.reasons.push("Author bypasses moderation".to_string());
                return verdict;
            }
        }

        if let Some(term) = settings
            .whitelist_terms
            .iter()
            .find(|t| contains_term(text, t))
        {
            let mut verdict = ModerationVerdict::pass(level);
            verdict.reasons.push(format!("Whitelisted term: {}", term));
            return verdict;
        }

        let blacklisted: Vec<String> = settings
            .blacklist_terms
            .iter()
            .filter(|t| contains_term(text, t))
            .cloned()
            .collect();
        if !blacklisted.is_empty() {
            let mut verdict = ModerationVerdict::reject(
                level,
                format!("Contains blacklisted terms: {}", blacklisted.join(", ")),
            );
            verdict
                .suggestions
                .push("Remove or rephrase the flagged terms".to_string());
            verdict.flagged_keywords = blacklisted;
            return verdict;
        }

        self.evaluate_with(text, level, settings.use_classifier).await
    }

    /// Moderate an article's fields as one text. On replacement each field
    /// is rewritten separately so the fields stay apart.
    pub async fn moderate_article(
        &self,
        title: &str,
        content: &str,
        excerpt: &str,
        actor: &Actor,
    ) -> ArticleModeration {
        let settings = self.settings_or_default().await;
        let combined = [title, content, excerpt]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");

        let verdict = self.moderate_with(&combined, actor, &settings).await;

        let mut result = ArticleModeration {
            title: title.to_string(),
            content: content.to_string(),
            excerpt: excerpt.to_string(),
            verdict,
        };

        if result.verdict.disposition == Disposition::PassWithReplacement {
            let types = settings.level.strategy().replaced_types();
            match self.words.dictionary().await {
                Ok(dictionary) => {
                    result.title = dictionary.replace(title, &types);
                    result.content = dictionary.replace(content, &types);
                    result.excerpt = dictionary.replace(excerpt, &types);
                }
                Err(e) => {
                    // Cannot rewrite field by field; refuse instead of storing unmasked text.
                    tracing::error!(
                        error = %e,
                        "Word dictionary unavailable while masking article"
                    );
                    result.verdict.passed = false;
                    result.verdict.disposition = Disposition::Reject;
                    result
                        .verdict
                        .reasons
                        .push("Sensitive-word dictionary unavailable".to_string());
                }
            }
        }

        result
    }

    /// Evaluate several texts at `level` (default: the configured level).
    pub async fn batch_moderate(
        &self,
        texts: &[String],
        level: Option<ModerationLevel>,
    ) -> BatchModeration {
        let level = match level {
            Some(level) => level,
            None => self.current_level().await,
        };

        let mut verdicts = Vec::with_capacity(texts.len());
        let mut summary = BatchSummary {
            total: texts.len(),
            ..Default::default()
        };

        for text in texts {
            let verdict = self.evaluate(text, level).await;
            match verdict.disposition {
                Disposition::Pass => summary.passed += 1,
                Disposition::PassWithReplacement => summary.replaced += 1,
                Disposition::Reject => summary.blocked += 1,
            }
            verdicts.push(verdict);
        }

        BatchModeration { verdicts, summary }
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub async fn current_settings(&self) -> Result<ModerationSettings, ModerationError> {
        Ok(self.settings.load().await?.unwrap_or_default())
    }

    pub async fn current_level(&self) -> ModerationLevel {
        self.settings_or_default().await.level
    }

    async fn settings_or_default(&self) -> ModerationSettings {
        match self.settings.load().await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load moderation settings, using defaults");
                ModerationSettings::default()
            }
        }
    }

    /// Change the level only.
    pub async fn set_level(
        &self,
        level: ModerationLevel,
        operator: &Actor,
    ) -> Result<ModerationSettings, ModerationError> {
        self.require(operator).await?;
        let mut settings = self.current_settings().await?;
        let old_level = settings.level;
        if old_level == level {
            return Ok(settings);
        }

        settings.level = level;
        settings.updated_at = Some(Utc::now());
        settings.updated_by = operator.user_id;
        self.settings.save(&settings).await?;

        tracing::info!(old = %old_level, new = %level, "Moderation level changed");
        self.audit_level_change(operator, old_level, level).await;

        Ok(settings)
    }

    /// Replace the whole settings record.
    pub async fn update_settings(
        &self,
        settings: ModerationSettings,
        operator: &Actor,
    ) -> Result<ModerationSettings, ModerationError> {
        self.require(operator).await?;
        let old = self.current_settings().await?;
        let mut settings = settings.normalized();
        settings.updated_at = Some(Utc::now());
        settings.updated_by = operator.user_id;
        self.settings.save(&settings).await?;

        if old.level != settings.level {
            self.audit_level_change(operator, old.level, settings.level)
                .await;
        }

        let event = AuditEvent::new(AuditAction::ModerationSettingsChange)
            .on(ResourceType::ModerationConfig, None)
            .old_values(settings_snapshot(&old))
            .new_values(settings_snapshot(&settings));
        self.audit.record(operator, event).await;

        Ok(settings)
    }

    async fn audit_level_change(
        &self,
        operator: &Actor,
        old: ModerationLevel,
        new: ModerationLevel,
    ) {
        if let Err(e) = self
            .audit
            .log_moderation_level_change(operator, old.as_str(), new.as_str(), None)
            .await
        {
            tracing::warn!(old = %old, new = %new, error = %e, "Level change not audited");
        }
    }

    async fn require(&self, operator: &Actor) -> Result<(), ModerationError> {
        if self
            .permissions
            .has_capability(operator, Capability::ManageSettings)
            .await
        {
            Ok(())
        } else {
            Err(ModerationError::PermissionDenied)
        }
    }

    /// The rules in force at `level` (default: the configured level).
    pub async fn rules(
        &self,
        level: Option<ModerationLevel>,
    ) -> Result<ModerationRules, ModerationError> {
        let settings = self.current_settings().await?;
        let level = level.unwrap_or(settings.level);
        Ok(ModerationRules {
            level,
            description: level.description(),
            strategy: level.strategy(),
            whitelist_terms: settings.whitelist_terms,
            blacklist_terms: settings.blacklist_terms,
            bypass_users: settings.bypass_users,
            classifier_enabled: settings.use_classifier && self.classifier.is_some(),
        })
    }
}

fn settings_snapshot(settings: &ModerationSettings) -> serde_json::Value {
    json!({
        "level": settings.level.as_str(),
        "whitelist_terms": settings.whitelist_terms,
        "blacklist_terms": settings.blacklist_terms,
        "bypass_users": settings.bypass_users,
        "use_classifier": settings.use_classifier,
    })
}

fn distinct_terms<'a>(matches: impl Iterator<Item = &'a WordMatch>) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for m in matches {
        if !terms.contains(&m.term) {
            terms.push(m.term.clone());
        }
    }
    terms
}

fn extend_distinct(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Combine a non-rejecting local verdict with the classifier's.
fn merge(local: ModerationVerdict, external: ClassifierVerdict) -> ModerationVerdict {
    let mut merged = local;
    merged.classifier_consulted = true;
    merged.passed = merged.passed && external.passed;
    if !merged.passed {
        merged.disposition = Disposition::Reject;
        merged.text = None;
    }
    merged.score = if external.score.is_finite() {
        external.score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    merged.risk_level = merged.risk_level.max(external.risk_level);
    if !external.passed && merged.risk_level == RiskLevel::Low {
        merged.risk_level = RiskLevel::Medium;
    }
    extend_distinct(&mut merged.reasons, external.reasons);
    extend_distinct(&mut merged.suggestions, external.suggestions);
    extend_distinct(&mut merged.flagged_keywords, external.flagged_keywords);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::{AuditError, AuditFilter, AuditLogEntry, AuditStore, NewAuditEntry};
    use crate::infra::audit::InMemoryAuditStore;
    use crate::infra::moderation::InMemorySettingsStore;
    use crate::infra::permissions::StaticPermissions;
    use crate::infra::words::InMemoryWordStore;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Classifier double that replays a script of outcomes.
    struct ScriptedClassifier {
        script: Mutex<Vec<Result<ClassifierVerdict, ClassifierError>>>,
        calls: AtomicU32,
        last_text: Mutex<Option<String>>,
        last_strict_level: Mutex<Option<u8>>,
        delay: Option<Duration>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Result<ClassifierVerdict, ClassifierError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                last_text: Mutex::new(None),
                last_strict_level: Mutex::new(None),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            let mut classifier = Self::new(vec![]);
            classifier.delay = Some(delay);
            classifier
        }
    }

    #[async_trait]
    impl ContentClassifier for ScriptedClassifier {
        async fn evaluate(
            &self,
            text: &str,
            options: &ClassifierOptions,
        ) -> Result<ClassifierVerdict, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_text.lock().unwrap() = Some(text.to_string());
            *self.last_strict_level.lock().unwrap() = Some(options.strict_level);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(clean())
            } else {
                script.remove(0)
            }
        }
    }

    fn clean() -> ClassifierVerdict {
        ClassifierVerdict {
            passed: true,
            score: 0.1,
            risk_level: RiskLevel::Low,
            reasons: vec![],
            suggestions: vec![],
            flagged_keywords: vec![],
        }
    }

    fn flagged() -> ClassifierVerdict {
        ClassifierVerdict {
            passed: false,
            score: 0.92,
            risk_level: RiskLevel::High,
            reasons: vec!["Violent content".to_string()],
            suggestions: vec!["Rewrite the paragraph".to_string()],
            flagged_keywords: vec!["attack".to_string()],
        }
    }

    fn fast_policy() -> ClassifierPolicy {
        ClassifierPolicy {
            timeout: Duration::from_millis(50),
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    const ADMIN: i64 = 1;

    /// Audit store whose disk is always full.
    struct RefusingAuditStore;

    #[async_trait]
    impl AuditStore for RefusingAuditStore {
        async fn append(&self, _entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError> {
            Err(AuditError::StorageError("disk full".to_string()))
        }

        async fn query(
            &self,
            _filter: &AuditFilter,
            _limit: u32,
            _offset: u64,
        ) -> Result<Vec<AuditLogEntry>, AuditError> {
            Ok(Vec::new())
        }

        async fn count(&self, _filter: &AuditFilter) -> Result<u64, AuditError> {
            Ok(0)
        }

        async fn max_id(&self) -> Result<Option<i64>, AuditError> {
            Ok(None)
        }

        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64, AuditError> {
            Ok(0)
        }
    }

    struct Fixture {
        engine: ModerationEngine,
        words: Arc<SensitiveWordService>,
        audit: Arc<AuditLogger>,
    }

    fn fixture_over(audit_store: Arc<dyn AuditStore>) -> Fixture {
        let permissions = Arc::new(StaticPermissions::moderators([ADMIN]));
        let audit = Arc::new(AuditLogger::new(audit_store, permissions.clone()));
        let words = Arc::new(SensitiveWordService::new(
            Arc::new(InMemoryWordStore::new()),
            permissions.clone(),
            audit.clone(),
        ));
        let engine = ModerationEngine::new(
            words.clone(),
            Arc::new(InMemorySettingsStore::new()),
            permissions,
            audit.clone(),
        );
        Fixture {
            engine,
            words,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_over(Arc::new(InMemoryAuditStore::new()))
    }

    fn fixture_with(classifier: Arc<ScriptedClassifier>) -> Fixture {
        let f = fixture();
        Fixture {
            engine: f.engine.with_classifier(classifier, fast_policy()),
            ..f
        }
    }

    async fn add(words: &SensitiveWordService, term: &str, word_type: WordType) {
        words
            .upsert(term, word_type, None, &Actor::user(ADMIN))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_high_risk_word_rejects_at_default_level() {
        let f = fixture();
        add(&f.words, "暴力", WordType::HighRisk).await;

        let verdict = f.engine.evaluate("这是暴力内容", ModerationLevel::Default).await;

        assert!(!verdict.passed);
        assert_eq!(verdict.disposition, Disposition::Reject);
        assert_eq!(verdict.flagged_keywords, vec!["暴力".to_string()]);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert_eq!(verdict.score, 0.8);
        assert!(verdict.reasons[0].contains("暴力"));
    }

    #[tokio::test]
    async fn test_normal_word_is_masked_at_default_level() {
        let f = fixture();
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f.engine.evaluate("这是垃圾", ModerationLevel::Default).await;

        assert!(verdict.passed);
        assert_eq!(verdict.disposition, Disposition::PassWithReplacement);
        assert_eq!(verdict.text.as_deref(), Some("这是**"));
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_strict_rejects_normal_word_even_if_classifier_passes() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(clean())]));
        let f = fixture_with(classifier.clone());
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f.engine.evaluate("这是垃圾", ModerationLevel::Strict).await;

        assert_eq!(verdict.disposition, Disposition::Reject);
        assert!(!verdict.passed);
        // The local reject is final; the classifier is not consulted.
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lenient_ignores_normal_words() {
        let f = fixture();
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f.engine.evaluate("这是垃圾", ModerationLevel::Lenient).await;

        assert_eq!(verdict.disposition, Disposition::Pass);
        assert!(verdict.flagged_keywords.is_empty());
        assert_eq!(verdict.text, None);
    }

    #[tokio::test]
    async fn test_empty_text_passes_without_classifier() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(flagged())]));
        let f = fixture_with(classifier.clone());

        let verdict = f.engine.evaluate("", ModerationLevel::Strict).await;

        assert!(verdict.passed);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_sees_replaced_text_and_strict_level() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(clean())]));
        let f = fixture_with(classifier.clone());
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f.engine.evaluate("这是垃圾", ModerationLevel::Default).await;

        assert!(verdict.classifier_consulted);
        assert_eq!(verdict.disposition, Disposition::PassWithReplacement);
        assert_eq!(verdict.score, 0.1);
        assert_eq!(
            classifier.last_text.lock().unwrap().as_deref(),
            Some("这是**")
        );
        assert_eq!(*classifier.last_strict_level.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_classifier_reject_wins_and_merges() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(flagged())]));
        let f = fixture_with(classifier);

        let verdict = f
            .engine
            .evaluate("we will attack at dawn", ModerationLevel::Lenient)
            .await;

        assert!(!verdict.passed);
        assert_eq!(verdict.disposition, Disposition::Reject);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert_eq!(verdict.score, 0.92);
        assert_eq!(verdict.flagged_keywords, vec!["attack".to_string()]);
        assert_eq!(verdict.suggestions, vec!["Rewrite the paragraph".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![
            Err(ClassifierError::Transient("503".to_string())),
            Err(ClassifierError::Transient("429".to_string())),
            Ok(flagged()),
        ]));
        let f = fixture_with(classifier.clone());

        let verdict = f.engine.evaluate("hello", ModerationLevel::Default).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_to_local() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![
            Err(ClassifierError::Transient("503".to_string())),
            Err(ClassifierError::Transient("503".to_string())),
            Err(ClassifierError::Transient("503".to_string())),
        ]));
        let f = fixture_with(classifier.clone());
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f.engine.evaluate("这是垃圾", ModerationLevel::Default).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert!(!verdict.classifier_consulted);
        assert_eq!(verdict.disposition, Disposition::PassWithReplacement);
        assert_eq!(verdict.text.as_deref(), Some("这是**"));
    }

    #[tokio::test]
    async fn test_permanent_and_malformed_errors_do_not_retry() {
        for error in [
            ClassifierError::Permanent("401".to_string()),
            ClassifierError::Malformed("no json".to_string()),
        ] {
            let classifier = Arc::new(ScriptedClassifier::new(vec![Err(error)]));
            let f = fixture_with(classifier.clone());

            let verdict = f.engine.evaluate("hello", ModerationLevel::Default).await;

            assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
            assert!(verdict.passed);
        }
    }

    #[tokio::test]
    async fn test_timeouts_fall_back_to_local() {
        let classifier = Arc::new(ScriptedClassifier::slow(Duration::from_millis(500)));
        let f = fixture_with(classifier.clone());

        let verdict = f.engine.evaluate("hello", ModerationLevel::Default).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert!(verdict.passed);
        assert!(!verdict.classifier_consulted);
    }

    #[tokio::test]
    async fn test_stricter_level_never_loosens() {
        let f = fixture();
        add(&f.words, "垃圾", WordType::Normal).await;
        add(&f.words, "暴力", WordType::HighRisk).await;

        for text in ["clean", "这是垃圾", "这是暴力", "垃圾暴力"] {
            let mut previous: Option<ModerationVerdict> = None;
            for level in ModerationLevel::ALL {
                let verdict = f.engine.evaluate(text, level).await;
                if let Some(prev) = &previous {
                    if prev.is_rejected() {
                        assert!(verdict.is_rejected(), "{} loosened at {}", text, level);
                    }
                }
                previous = Some(verdict);
            }
        }
    }

    #[tokio::test]
    async fn test_bypass_whitelist_blacklist_order() {
        let f = fixture();
        add(&f.words, "暴力", WordType::HighRisk).await;
        let admin = Actor::user(ADMIN);
        f.engine
            .update_settings(
                ModerationSettings {
                    whitelist_terms: vec!["历史研究".to_string()],
                    blacklist_terms: vec!["casino".to_string()],
                    bypass_users: vec![42],
                    ..ModerationSettings::default()
                },
                &admin,
            )
            .await
            .unwrap();

        let bypass = f.engine.moderate_text("暴力", &Actor::user(42)).await;
        assert!(bypass.passed);

        let whitelisted = f
            .engine
            .moderate_text("历史研究中的暴力", &Actor::user(7))
            .await;
        assert!(whitelisted.passed);

        let blacklisted = f.engine.moderate_text("Online CASINO", &Actor::user(7)).await;
        assert!(!blacklisted.passed);
        assert_eq!(blacklisted.flagged_keywords, vec!["casino".to_string()]);

        let plain = f.engine.moderate_text("暴力", &Actor::user(7)).await;
        assert!(!plain.passed);
    }

    #[tokio::test]
    async fn test_moderate_article_rewrites_each_field() {
        let f = fixture();
        add(&f.words, "垃圾", WordType::Normal).await;

        let result = f
            .engine
            .moderate_article("垃圾标题", "正文没有问题", "摘要垃圾", &Actor::user(3))
            .await;

        assert_eq!(result.verdict.disposition, Disposition::PassWithReplacement);
        assert_eq!(result.title, "**标题");
        assert_eq!(result.content, "正文没有问题");
        assert_eq!(result.excerpt, "摘要**");
    }

    #[tokio::test]
    async fn test_batch_moderate_summary() {
        let f = fixture();
        add(&f.words, "垃圾", WordType::Normal).await;
        add(&f.words, "暴力", WordType::HighRisk).await;

        let texts = vec![
            "fine".to_string(),
            "这是垃圾".to_string(),
            "这是暴力".to_string(),
        ];
        let batch = f.engine.batch_moderate(&texts, None).await;

        assert_eq!(
            batch.summary,
            BatchSummary {
                total: 3,
                passed: 1,
                replaced: 1,
                blocked: 1
            }
        );
    }

    #[tokio::test]
    async fn test_set_level_is_audited() {
        let f = fixture();
        let admin = Actor::user(ADMIN);

        let settings = f
            .engine
            .set_level(ModerationLevel::Strict, &admin)
            .await
            .unwrap();
        assert_eq!(settings.level, ModerationLevel::Strict);
        assert_eq!(settings.updated_by, Some(ADMIN));
        assert_eq!(f.engine.current_level().await, ModerationLevel::Strict);

        let logs = f
            .audit
            .get_logs(&admin, &AuditFilter::default(), 1, 10)
            .await
            .unwrap()
            .logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "moderation_level.change");
        assert_eq!(logs[0].new_values.as_ref().unwrap()["level"], "strict");

        let rules = f.engine.rules(Some(ModerationLevel::Lenient)).await.unwrap();
        assert_eq!(rules.level, ModerationLevel::Lenient);
        assert!(!rules.classifier_enabled);
    }

    #[tokio::test]
    async fn test_settings_changes_need_manage_settings() {
        let f = fixture();

        for outsider in [Actor::user(9), Actor::system()] {
            assert!(matches!(
                f.engine.set_level(ModerationLevel::Lenient, &outsider).await,
                Err(ModerationError::PermissionDenied)
            ));
            let loosened = ModerationSettings {
                bypass_users: vec![9],
                ..ModerationSettings::default()
            };
            assert!(matches!(
                f.engine.update_settings(loosened, &outsider).await,
                Err(ModerationError::PermissionDenied)
            ));
        }

        let current = f.engine.current_settings().await.unwrap();
        assert_eq!(current.level, ModerationLevel::Default);
        assert!(current.bypass_users.is_empty());
        let total = f
            .audit
            .get_logs(&Actor::user(ADMIN), &AuditFilter::default(), 1, 10)
            .await
            .unwrap()
            .total;
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_settings_change_survives_audit_failure() {
        let f = fixture_over(Arc::new(RefusingAuditStore));
        let admin = Actor::user(ADMIN);

        let settings = f
            .engine
            .set_level(ModerationLevel::Strict, &admin)
            .await
            .unwrap();
        assert_eq!(settings.level, ModerationLevel::Strict);

        let settings = f
            .engine
            .update_settings(ModerationSettings::default(), &admin)
            .await
            .unwrap();
        assert_eq!(settings.level, ModerationLevel::Default);
        assert_eq!(f.engine.current_level().await, ModerationLevel::Default);
    }

    #[tokio::test]
    async fn test_classifier_reject_drops_masked_text() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(flagged())]));
        let f = fixture_with(classifier);
        add(&f.words, "垃圾", WordType::Normal).await;

        let verdict = f
            .engine
            .evaluate("这是垃圾 attack", ModerationLevel::Default)
            .await;

        assert!(!verdict.passed);
        assert_eq!(verdict.disposition, Disposition::Reject);
        assert_eq!(verdict.text, None);
        assert!(verdict.flagged_keywords.contains(&"垃圾".to_string()));
        assert!(verdict.flagged_keywords.contains(&"attack".to_string()));
    }
}
