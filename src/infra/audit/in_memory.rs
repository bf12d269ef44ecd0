// In-memory AuditStore, used by tests and when no database is configured.

use crate::core::audit::{AuditError, AuditFilter, AuditLogEntry, AuditStore, NewAuditEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct InMemoryAuditStore {
    entries: DashMap<i64, AuditLogEntry>,
    next_id: AtomicI64,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn matching(&self, filter: &AuditFilter) -> Vec<AuditLogEntry> {
        let mut entries: Vec<AuditLogEntry> = self
            .entries
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        entries
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = AuditLogEntry::from_new(id, entry);
        self.entries.insert(id, stored.clone());
        Ok(stored)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, filter: &AuditFilter) -> Result<u64, AuditError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| filter.matches(e.value()))
            .count() as u64)
    }

    async fn max_id(&self) -> Result<Option<i64>, AuditError> {
        Ok(self.entries.iter().map(|e| *e.key()).max())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditError> {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.created_at >= cutoff);
        Ok((before - self.entries.len()) as u64)
    }
}
