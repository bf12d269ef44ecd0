// Sensitive-word service - the dictionary the moderation engine scans with.
//
// Maintains the words, validates them, and keeps an in-process snapshot of the
// active dictionary. Every mutation bumps a version counter and the next scan
// rebuilds the snapshot, so a change is visible to the very next call.

use super::word_matcher::Dictionary;
use super::word_models::{
    BulkReport, ImportFailure, ImportReport, SensitiveWord, WordBulkAction, WordDraft, WordFilter,
    WordMatch, WordPage, WordPatch, WordStatistics, WordType, BUILTIN_HIGH_RISK, BUILTIN_NORMAL,
    MAX_REPLACEMENT_CHARS, MAX_TERM_CHARS,
};
use crate::core::access::{Actor, Capability, PermissionChecker};
use crate::core::audit::{AuditEvent, AuditLogger, ResourceType, WordChange};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum WordError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Word '{term}' ({word_type}) already exists")]
    Duplicate { term: String, word_type: WordType },

    #[error("Word {0} not found")]
    NotFound(i64),

    #[error("Word {0} is built in and cannot be deleted without force")]
    BuiltinProtected(i64),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait WordStore: Send + Sync {
    /// Insert a new word. Fails with `Duplicate` if `(term, word_type)` exists.
    async fn insert(&self, draft: WordDraft) -> Result<SensitiveWord, WordError>;

    /// Overwrite the mutable fields of an existing word.
    async fn update(&self, word: &SensitiveWord) -> Result<(), WordError>;

    async fn get(&self, id: i64) -> Result<Option<SensitiveWord>, WordError>;

    async fn find_by_term(
        &self,
        term: &str,
        word_type: WordType,
    ) -> Result<Option<SensitiveWord>, WordError>;

    /// Returns false if no word had this id.
    async fn delete(&self, id: i64) -> Result<bool, WordError>;

    /// Words matching the filter (paged, ordered by id) and the unpaged total.
    async fn list(&self, filter: &WordFilter) -> Result<(Vec<SensitiveWord>, u64), WordError>;

    async fn active_words(&self) -> Result<Vec<SensitiveWord>, WordError>;

    async fn statistics(&self) -> Result<WordStatistics, WordError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

struct Snapshot {
    version: u64,
    dictionary: Arc<Dictionary>,
}

pub struct SensitiveWordService {
    store: Arc<dyn WordStore>,
    permissions: Arc<dyn PermissionChecker>,
    audit: Arc<AuditLogger>,
    version: AtomicU64,
    snapshot: RwLock<Option<Snapshot>>,
}

impl SensitiveWordService {
    pub fn new(
        store: Arc<dyn WordStore>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            permissions,
            audit,
            version: AtomicU64::new(1),
            snapshot: RwLock::new(None),
        }
    }

    /// Current dictionary version. Changes after every mutation.
    pub fn dictionary_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Drop the cached snapshot, e.g. after another process edited the store.
    pub fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot of the active dictionary, rebuilt if stale.
    ///
    /// If the store cannot be read, a stale snapshot is served rather than
    /// none; only a cold cache surfaces the error.
    pub async fn dictionary(&self) -> Result<Arc<Dictionary>, WordError> {
        let version = self.dictionary_version();
        {
            let cached = self.snapshot.read().await;
            if let Some(snapshot) = cached.as_ref().filter(|s| s.version == version) {
                return Ok(snapshot.dictionary.clone());
            }
        }

        match self.store.active_words().await {
            Ok(words) => {
                let dictionary = Arc::new(Dictionary::new(words));
                let mut cached = self.snapshot.write().await;
                *cached = Some(Snapshot {
                    version,
                    dictionary: dictionary.clone(),
                });
                tracing::debug!(version, words = dictionary.len(), "Rebuilt word dictionary");
                Ok(dictionary)
            }
            Err(e) => {
                let cached = self.snapshot.read().await;
                match cached.as_ref() {
                    Some(stale) => {
                        tracing::warn!(error = %e, "Serving stale word dictionary");
                        Ok(stale.dictionary.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Every occurrence of an active term of one of `types` in `text`.
    pub async fn find_matches(
        &self,
        text: &str,
        types: &[WordType],
    ) -> Result<Vec<WordMatch>, WordError> {
        Ok(self.dictionary().await?.find_matches(text, types))
    }

    /// `text` with terms of `types` replaced by their replacement.
    pub async fn replace(&self, text: &str, types: &[WordType]) -> Result<String, WordError> {
        Ok(self.dictionary().await?.replace(text, types))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Create a word, or reactivate it if it exists but is inactive.
    ///
    /// An active `(term, word_type)` pair is a `Duplicate`.
    pub async fn upsert(
        &self,
        term: &str,
        word_type: WordType,
        replacement: Option<&str>,
        operator: &Actor,
    ) -> Result<SensitiveWord, WordError> {
        self.require(operator).await?;
        let term = normalize_term(term)?;
        let replacement = normalize_replacement(replacement, word_type)?;

        if let Some(mut existing) = self.store.find_by_term(&term, word_type).await? {
            if existing.is_active {
                return Err(WordError::Duplicate { term, word_type });
            }
            let old = existing.audit_snapshot();
            existing.is_active = true;
            existing.replacement = replacement;
            existing.updated_at = Utc::now();
            self.store.update(&existing).await?;
            self.invalidate();

            self.audit_word(operator, Some(existing.id), WordChange::Activate)
                .old_values(old)
                .new_values(existing.audit_snapshot())
                .send(&self.audit)
                .await;
            return Ok(existing);
        }

        let word = self
            .store
            .insert(WordDraft {
                term,
                word_type,
                replacement,
                is_builtin: false,
                is_active: true,
                created_by: operator.user_id,
                created_at: Utc::now(),
            })
            .await?;
        self.invalidate();

        tracing::info!(word_id = word.id, word_type = %word.word_type, "Sensitive word created");
        self.audit_word(operator, Some(word.id), WordChange::Create)
            .new_values(word.audit_snapshot())
            .send(&self.audit)
            .await;

        Ok(word)
    }

    /// Seed a built-in word. Existing pairs are left untouched.
    pub async fn seed_builtin(
        &self,
        term: &str,
        word_type: WordType,
    ) -> Result<Option<SensitiveWord>, WordError> {
        let term = normalize_term(term)?;
        if self.store.find_by_term(&term, word_type).await?.is_some() {
            return Ok(None);
        }
        let word = self
            .store
            .insert(WordDraft {
                term,
                replacement: word_type.default_replacement().to_string(),
                word_type,
                is_builtin: true,
                is_active: true,
                created_by: None,
                created_at: Utc::now(),
            })
            .await?;
        self.invalidate();
        Ok(Some(word))
    }

    /// Seed the built-in dictionary. Returns how many words were added.
    pub async fn initialize_builtin_words(&self) -> Result<usize, WordError> {
        let lists = [
            (WordType::HighRisk, &BUILTIN_HIGH_RISK[..]),
            (WordType::Normal, &BUILTIN_NORMAL[..]),
        ];
        let mut added = 0;
        for (word_type, terms) in lists {
            for term in terms {
                if self.seed_builtin(term, word_type).await?.is_some() {
                    added += 1;
                }
            }
        }
        if added > 0 {
            tracing::info!(added, "Built-in sensitive words seeded");
        }
        Ok(added)
    }

    pub async fn update_word(
        &self,
        id: i64,
        patch: WordPatch,
        operator: &Actor,
    ) -> Result<SensitiveWord, WordError> {
        self.require(operator).await?;
        let mut word = self.get_word(id).await?;
        let old = word.audit_snapshot();

        if let Some(term) = patch.term.as_deref() {
            word.term = normalize_term(term)?;
        }
        if let Some(word_type) = patch.word_type {
            word.word_type = word_type;
        }
        if let Some(replacement) = patch.replacement.as_deref() {
            word.replacement = normalize_replacement(Some(replacement), word.word_type)?;
        }
        if let Some(is_active) = patch.is_active {
            word.is_active = is_active;
        }

        if let Some(other) = self.store.find_by_term(&word.term, word.word_type).await? {
            if other.id != word.id {
                return Err(WordError::Duplicate {
                    term: word.term,
                    word_type: word.word_type,
                });
            }
        }

        word.updated_at = Utc::now();
        self.store.update(&word).await?;
        self.invalidate();

        self.audit_word(operator, Some(id), WordChange::Update)
            .old_values(old)
            .new_values(word.audit_snapshot())
            .send(&self.audit)
            .await;

        Ok(word)
    }

    pub async fn toggle_active(
        &self,
        id: i64,
        is_active: bool,
        operator: &Actor,
    ) -> Result<SensitiveWord, WordError> {
        self.require(operator).await?;
        let mut word = self.get_word(id).await?;
        if word.is_active == is_active {
            return Ok(word);
        }

        word.is_active = is_active;
        word.updated_at = Utc::now();
        self.store.update(&word).await?;
        self.invalidate();

        let change = if is_active {
            WordChange::Activate
        } else {
            WordChange::Deactivate
        };
        self.audit_word(operator, Some(id), change)
            .old_values(json!({ "is_active": !is_active }))
            .new_values(json!({ "is_active": is_active }))
            .send(&self.audit)
            .await;

        Ok(word)
    }

    /// Delete a word. Built-in words need `force`.
    pub async fn delete(&self, id: i64, force: bool, operator: &Actor) -> Result<(), WordError> {
        self.require(operator).await?;
        let word = self.remove(id, force).await?;
        self.invalidate();

        tracing::info!(word_id = id, "Sensitive word deleted");
        self.audit_word(operator, Some(id), WordChange::Delete)
            .old_values(word.audit_snapshot())
            .send(&self.audit)
            .await;
        Ok(())
    }

    /// Import many terms of one type. A bad term is reported and skipped;
    /// one summary entry is audited for the whole batch.
    pub async fn bulk_import(
        &self,
        terms: &[String],
        word_type: WordType,
        operator: &Actor,
    ) -> Result<ImportReport, WordError> {
        self.require(operator).await?;
        let mut report = ImportReport::default();

        for raw in terms {
            match self.import_one(raw, word_type, operator.user_id).await {
                Ok(()) => report.success_count += 1,
                Err(e) => report.failures.push(ImportFailure {
                    term: raw.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if report.success_count > 0 {
            self.invalidate();
        }

        tracing::info!(
            word_type = %word_type,
            imported = report.success_count,
            failed = report.failures.len(),
            "Bulk word import finished"
        );
        self.audit_word(operator, None, WordChange::Import)
            .new_values(json!({
                "word_type": word_type.as_str(),
                "requested": terms.len(),
                "success_count": report.success_count,
                "failed_count": report.failures.len(),
            }))
            .send(&self.audit)
            .await;

        Ok(report)
    }

    /// Delete many words without force; built-ins are reported as failures.
    pub async fn bulk_delete(
        &self,
        ids: &[i64],
        operator: &Actor,
    ) -> Result<BulkReport, WordError> {
        self.require(operator).await?;
        let mut report = BulkReport::default();

        for &id in ids {
            match self.remove(id, false).await {
                Ok(_) => report.success_count += 1,
                Err(e) => {
                    report.failed_ids.push(id);
                    report.errors.push(format!("ID {}: {}", id, e));
                }
            }
        }

        if report.success_count > 0 {
            self.invalidate();
        }

        self.audit_word(operator, None, WordChange::BulkDelete)
            .new_values(json!({
                "requested_ids": ids,
                "success_count": report.success_count,
                "failed_ids": report.failed_ids,
            }))
            .send(&self.audit)
            .await;

        Ok(report)
    }

    /// Activate, deactivate or delete many words.
    pub async fn apply_bulk_action(
        &self,
        ids: &[i64],
        action: WordBulkAction,
        operator: &Actor,
    ) -> Result<BulkReport, WordError> {
        self.require(operator).await?;
        let is_active = match action {
            WordBulkAction::Delete => return self.bulk_delete(ids, operator).await,
            WordBulkAction::Activate => true,
            WordBulkAction::Deactivate => false,
        };

        let mut report = BulkReport::default();
        for &id in ids {
            match self.toggle_active(id, is_active, operator).await {
                Ok(_) => report.success_count += 1,
                Err(e) => {
                    report.failed_ids.push(id);
                    report.errors.push(format!("ID {}: {}", id, e));
                }
            }
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn get_word(&self, id: i64) -> Result<SensitiveWord, WordError> {
        self.store.get(id).await?.ok_or(WordError::NotFound(id))
    }

    pub async fn list_words(&self, filter: &WordFilter) -> Result<WordPage, WordError> {
        let (words, total) = self.store.list(filter).await?;
        Ok(WordPage {
            words,
            total,
            page: filter.page.max(1),
            per_page: filter.per_page,
        })
    }

    pub async fn statistics(&self) -> Result<WordStatistics, WordError> {
        self.store.statistics().await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn import_one(
        &self,
        raw: &str,
        word_type: WordType,
        created_by: Option<i64>,
    ) -> Result<(), WordError> {
        let term = normalize_term(raw)?;
        if self.store.find_by_term(&term, word_type).await?.is_some() {
            return Err(WordError::Duplicate { term, word_type });
        }
        self.store
            .insert(WordDraft {
                term,
                word_type,
                replacement: word_type.default_replacement().to_string(),
                is_builtin: false,
                is_active: true,
                created_by,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn remove(&self, id: i64, force: bool) -> Result<SensitiveWord, WordError> {
        let word = self.get_word(id).await?;
        if word.is_builtin && !force {
            return Err(WordError::BuiltinProtected(id));
        }
        if !self.store.delete(id).await? {
            return Err(WordError::NotFound(id));
        }
        Ok(word)
    }

    async fn require(&self, operator: &Actor) -> Result<(), WordError> {
        if self
            .permissions
            .has_capability(operator, Capability::ManageWords)
            .await
        {
            Ok(())
        } else {
            Err(WordError::PermissionDenied)
        }
    }

    fn audit_word(&self, operator: &Actor, word_id: Option<i64>, change: WordChange) -> WordAudit {
        WordAudit {
            operator: operator.clone(),
            event: AuditEvent::new(change.action()).on(ResourceType::SensitiveWord, word_id),
        }
    }
}

/// Pending audit entry for a dictionary change.
struct WordAudit {
    operator: Actor,
    event: AuditEvent,
}

impl WordAudit {
    fn old_values(mut self, values: serde_json::Value) -> Self {
        self.event = self.event.old_values(values);
        self
    }

    fn new_values(mut self, values: serde_json::Value) -> Self {
        self.event = self.event.new_values(values);
        self
    }

    async fn send(self, audit: &AuditLogger) {
        audit.record(&self.operator, self.event).await;
    }
}

fn normalize_term(term: &str) -> Result<String, WordError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(WordError::ValidationError("term must not be empty".to_string()));
    }
    if term.chars().count() > MAX_TERM_CHARS {
        return Err(WordError::ValidationError(format!(
            "term must be at most {} characters",
            MAX_TERM_CHARS
        )));
    }
    Ok(term.to_string())
}

fn normalize_replacement(
    replacement: Option<&str>,
    word_type: WordType,
) -> Result<String, WordError> {
    match replacement.filter(|r| !r.is_empty()) {
        None => Ok(word_type.default_replacement().to_string()),
        Some(r) if r.chars().count() > MAX_REPLACEMENT_CHARS => Err(WordError::ValidationError(
            format!("replacement must be at most {} characters", MAX_REPLACEMENT_CHARS),
        )),
        Some(r) => Ok(r.to_string()),
    }
}
