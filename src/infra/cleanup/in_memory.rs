use crate::core::cleanup::{
    CleanupError, CleanupLog, CleanupLogFilter, CleanupSettings, CleanupStatus, CleanupStore,
    NewCleanupLog, LOCK_TTL_SECS,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

struct HeldLock {
    holder: String,
    acquired_at: DateTime<Utc>,
}

pub struct InMemoryCleanupStore {
    settings: RwLock<Option<CleanupSettings>>,
    logs: DashMap<i64, CleanupLog>,
    next_id: AtomicI64,
    locks: DashMap<String, HeldLock>,
}

impl InMemoryCleanupStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(None),
            logs: DashMap::new(),
            next_id: AtomicI64::new(1),
            locks: DashMap::new(),
        }
    }
}

#[cfg(test)]
impl InMemoryCleanupStore {
    /// Backdate a held lock so it looks abandoned.
    pub fn age_lock(&self, name: &str, by: Duration) {
        if let Some(mut lock) = self.locks.get_mut(name) {
            lock.acquired_at = lock.acquired_at - by;
        }
    }
}

impl Default for InMemoryCleanupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CleanupStore for InMemoryCleanupStore {
    async fn load_settings(&self) -> Result<Option<CleanupSettings>, CleanupError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: &CleanupSettings) -> Result<(), CleanupError> {
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }

    async fn open_log(&self, new: NewCleanupLog) -> Result<CleanupLog, CleanupError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let log = CleanupLog {
            id,
            cleanup_type: new.cleanup_type,
            triggered_by: new.triggered_by,
            started_at: new.started_at,
            completed_at: None,
            status: CleanupStatus::Running,
            threshold_days: new.threshold_days,
            articles_deleted: 0,
            deleted_articles: Vec::new(),
            error_message: None,
        };
        self.logs.insert(id, log.clone());
        Ok(log)
    }

    async fn close_log(&self, log: &CleanupLog) -> Result<(), CleanupError> {
        let mut stored = self.logs.get_mut(&log.id).ok_or_else(|| {
            CleanupError::StorageError(format!("cleanup log {} does not exist", log.id))
        })?;
        *stored = log.clone();
        Ok(())
    }

    async fn get_log(&self, id: i64) -> Result<Option<CleanupLog>, CleanupError> {
        Ok(self.logs.get(&id).map(|l| l.value().clone()))
    }

    async fn list_logs(
        &self,
        filter: &CleanupLogFilter,
    ) -> Result<(Vec<CleanupLog>, u64), CleanupError> {
        let mut matching: Vec<CleanupLog> = self
            .logs
            .iter()
            .filter(|l| filter.matches(l.value()))
            .map(|l| l.value().clone())
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<CleanupLog>, CleanupError> {
        let mut logs: Vec<CleanupLog> = self
            .logs
            .iter()
            .filter(|l| l.started_at >= since)
            .map(|l| l.value().clone())
            .collect();
        logs.sort_by_key(|l| l.id);
        Ok(logs)
    }

    async fn try_acquire_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError> {
        let now = Utc::now();
        let fresh = HeldLock {
            holder: holder.to_string(),
            acquired_at: now,
        };
        match self.locks.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                if now - slot.get().acquired_at > Duration::seconds(LOCK_TTL_SECS) {
                    tracing::warn!(
                        lock = name,
                        previous_holder = %slot.get().holder,
                        "Reclaiming abandoned lock"
                    );
                    slot.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn renew_lock(&self, name: &str, holder: &str) -> Result<bool, CleanupError> {
        match self.locks.get_mut(name) {
            Some(mut lock) if lock.holder == holder => {
                lock.acquired_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<(), CleanupError> {
        self.locks.remove_if(name, |_, lock| lock.holder == holder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let store = InMemoryCleanupStore::new();
        assert!(store.try_acquire_lock("job", "a").await.unwrap());
        assert!(!store.try_acquire_lock("job", "b").await.unwrap());

        // Only the holder can release.
        store.release_lock("job", "b").await.unwrap();
        assert!(!store.try_acquire_lock("job", "b").await.unwrap());

        store.release_lock("job", "a").await.unwrap();
        assert!(store.try_acquire_lock("job", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_lock_is_reclaimed() {
        let store = InMemoryCleanupStore::new();
        store.locks.insert(
            "job".to_string(),
            HeldLock {
                holder: "crashed".to_string(),
                acquired_at: Utc::now() - Duration::seconds(LOCK_TTL_SECS + 60),
            },
        );
        assert!(store.try_acquire_lock("job", "next").await.unwrap());
        assert!(!store.try_acquire_lock("job", "third").await.unwrap());
    }

    #[tokio::test]
    async fn test_renewed_lock_is_not_reclaimed() {
        let store = InMemoryCleanupStore::new();
        assert!(store.try_acquire_lock("job", "a").await.unwrap());
        store.age_lock("job", Duration::seconds(LOCK_TTL_SECS + 60));

        assert!(store.renew_lock("job", "a").await.unwrap());
        assert!(!store.renew_lock("job", "b").await.unwrap());
        assert!(!store.try_acquire_lock("job", "b").await.unwrap());

        store.release_lock("job", "a").await.unwrap();
        assert!(!store.renew_lock("job", "a").await.unwrap());
    }
}
