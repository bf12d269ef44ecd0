use crate::core::words::{
    SensitiveWord, WordDraft, WordError, WordFilter, WordStatistics, WordStore, WordType,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// In-memory WordStore. Inserts are serialized so the `(term, word_type)`
/// uniqueness check and the insert happen as one step.
pub struct InMemoryWordStore {
    words: DashMap<i64, SensitiveWord>,
    next_id: AtomicI64,
    insert_lock: Mutex<()>,
}

impl InMemoryWordStore {
    pub fn new() -> Self {
        Self {
            words: DashMap::new(),
            next_id: AtomicI64::new(1),
            insert_lock: Mutex::new(()),
        }
    }

    fn find(&self, term: &str, word_type: WordType, except: Option<i64>) -> Option<SensitiveWord> {
        self.words
            .iter()
            .find(|w| w.term == term && w.word_type == word_type && Some(w.id) != except)
            .map(|w| w.value().clone())
    }
}

impl Default for InMemoryWordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WordStore for InMemoryWordStore {
    async fn insert(&self, draft: WordDraft) -> Result<SensitiveWord, WordError> {
        let _guard = self
            .insert_lock
            .lock()
            .map_err(|e| WordError::StorageError(e.to_string()))?;
        if self.find(&draft.term, draft.word_type, None).is_some() {
            return Err(WordError::Duplicate {
                term: draft.term,
                word_type: draft.word_type,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let word = SensitiveWord {
            id,
            term: draft.term,
            word_type: draft.word_type,
            replacement: draft.replacement,
            is_builtin: draft.is_builtin,
            is_active: draft.is_active,
            created_by: draft.created_by,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        self.words.insert(id, word.clone());
        Ok(word)
    }

    async fn update(&self, word: &SensitiveWord) -> Result<(), WordError> {
        if self.find(&word.term, word.word_type, Some(word.id)).is_some() {
            return Err(WordError::Duplicate {
                term: word.term.clone(),
                word_type: word.word_type,
            });
        }
        let mut stored = self
            .words
            .get_mut(&word.id)
            .ok_or(WordError::NotFound(word.id))?;
        *stored = word.clone();
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<SensitiveWord>, WordError> {
        Ok(self.words.get(&id).map(|w| w.value().clone()))
    }

    async fn find_by_term(
        &self,
        term: &str,
        word_type: WordType,
    ) -> Result<Option<SensitiveWord>, WordError> {
        Ok(self.find(term, word_type, None))
    }

    async fn delete(&self, id: i64) -> Result<bool, WordError> {
        Ok(self.words.remove(&id).is_some())
    }

    async fn list(&self, filter: &WordFilter) -> Result<(Vec<SensitiveWord>, u64), WordError> {
        let mut matching: Vec<SensitiveWord> = self
            .words
            .iter()
            .filter(|w| filter.matches(w.value()))
            .map(|w| w.value().clone())
            .collect();
        matching.sort_by_key(|w| w.id);
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn active_words(&self) -> Result<Vec<SensitiveWord>, WordError> {
        let mut active: Vec<SensitiveWord> = self
            .words
            .iter()
            .filter(|w| w.is_active)
            .map(|w| w.value().clone())
            .collect();
        active.sort_by_key(|w| w.id);
        Ok(active)
    }

    async fn statistics(&self) -> Result<WordStatistics, WordError> {
        let words: Vec<SensitiveWord> = self.words.iter().map(|w| w.value().clone()).collect();
        Ok(WordStatistics::tally(&words))
    }
}
