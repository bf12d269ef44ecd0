// Audit logger - the append-only trail every state-changing operation writes.
//
// Entries are written after the change they describe has committed. A failed
// audit write never rolls that change back. It is reported on the
// `audit_fallback` tracing target instead, so it can be routed somewhere
// other than the database that just refused it.

use super::audit_export::{ExportSink, EXPORT_PAGE_SIZE};
use super::audit_models::{
    AuditAction, AuditEvent, AuditFilter, AuditLogEntry, AuditPage, ExportFormat, ExportSummary,
    NewAuditEntry, ResourceType, UserChange, WordChange, MAX_EXPORT_ROWS, MAX_IP_LEN,
    MAX_PER_PAGE, MAX_RETENTION_DAYS, MAX_USER_AGENT_LEN,
};
use crate::core::access::{Actor, Capability, PermissionChecker};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry and return it with its assigned id.
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError>;

    /// Entries matching `filter`, ordered by `created_at` desc then `id` desc.
    async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditLogEntry>, AuditError>;

    async fn count(&self, filter: &AuditFilter) -> Result<u64, AuditError>;

    /// Highest id currently stored.
    async fn max_id(&self) -> Result<Option<i64>, AuditError>;

    /// Remove entries created strictly before `cutoff`. Returns the number removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    permissions: Arc<dyn PermissionChecker>,
}

impl AuditLogger {
    /// Writes are open to every service; reads need [`Capability::ViewAuditLog`].
    pub fn new(store: Arc<dyn AuditStore>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { store, permissions }
    }

    /// Append an entry for `event`, performed by `actor`.
    ///
    /// Failures are reported to the caller and also emitted on the
    /// `audit_fallback` target.
    pub async fn log(&self, actor: &Actor, event: AuditEvent) -> Result<AuditLogEntry, AuditError> {
        let entry = NewAuditEntry {
            user_id: actor.user_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            old_values: event.old_values,
            new_values: event.new_values,
            ip_address: sanitize_ip(actor.ip_address.as_deref()),
            user_agent: actor.user_agent.as_deref().map(truncate_user_agent),
            created_at: Utc::now(),
        };

        let action = entry.action;
        let resource_id = entry.resource_id;
        match self.store.append(entry).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                tracing::error!(
                    target: "audit_fallback",
                    action = %action,
                    resource_id = ?resource_id,
                    user_id = ?actor.user_id,
                    error = %e,
                    "Failed to persist audit entry"
                );
                Err(e)
            }
        }
    }

    /// Fire-and-forget variant of [`log`](Self::log) for callers whose own
    /// operation has already committed.
    pub async fn record(&self, actor: &Actor, event: AuditEvent) -> Option<AuditLogEntry> {
        self.log(actor, event).await.ok()
    }

    // ------------------------------------------------------------------------
    // Helpers with normalized naming
    // ------------------------------------------------------------------------

    pub async fn log_user_permission_change(
        &self,
        operator: &Actor,
        user_id: i64,
        change: UserChange,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let event = with_values(
            AuditEvent::new(change.action()).on(ResourceType::User, Some(user_id)),
            old_values,
            new_values,
        );
        self.log(operator, event).await
    }

    pub async fn log_sensitive_word_change(
        &self,
        operator: &Actor,
        word_id: Option<i64>,
        change: WordChange,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let event = with_values(
            AuditEvent::new(change.action()).on(ResourceType::SensitiveWord, word_id),
            old_values,
            new_values,
        );
        self.log(operator, event).await
    }

    pub async fn log_moderation_level_change(
        &self,
        operator: &Actor,
        old_level: &str,
        new_level: &str,
        config_changes: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut new_values = json!({ "level": new_level });
        if let Some(changes) = config_changes {
            new_values["config_changes"] = changes;
        }
        let event = AuditEvent::new(AuditAction::ModerationLevelChange)
            .on(ResourceType::ModerationConfig, None)
            .old_values(json!({ "level": old_level }))
            .new_values(new_values);
        self.log(operator, event).await
    }

    pub async fn log_cleanup_operation(
        &self,
        operator: &Actor,
        cleanup_log_id: Option<i64>,
        cleanup_type: &str,
        articles_deleted: u64,
        details: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut new_values = json!({
            "cleanup_type": cleanup_type,
            "articles_deleted": articles_deleted,
        });
        if let Some(details) = details {
            new_values["details"] = details;
        }
        let event = AuditEvent::new(AuditAction::CleanupRun)
            .on(ResourceType::Cleanup, cleanup_log_id)
            .new_values(new_values);
        self.log(operator, event).await
    }

    pub async fn log_system_error(
        &self,
        error_type: &str,
        message: &str,
        context: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut new_values = json!({ "error_type": error_type, "message": message });
        if let Some(context) = context {
            new_values["context"] = context;
        }
        let event = AuditEvent::new(AuditAction::SystemError)
            .on(ResourceType::System, None)
            .new_values(new_values);
        self.log(&Actor::system(), event).await
    }

    pub async fn log_api_operation(
        &self,
        actor: &Actor,
        api_action: &str,
        endpoint: &str,
        success: bool,
        request: Option<Value>,
        response: Option<Value>,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut new_values = json!({
            "api_action": api_action,
            "endpoint": endpoint,
            "success": success,
        });
        if let Some(request) = request {
            new_values["request"] = request;
        }
        if let Some(response) = response {
            new_values["response"] = response;
        }
        let event = AuditEvent::new(AuditAction::ApiCall)
            .on(ResourceType::Api, None)
            .new_values(new_values);
        self.log(actor, event).await
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// One page of entries, newest first. `page` is 1-based; `per_page` is
    /// clamped to `1..=MAX_PER_PAGE`.
    pub async fn get_logs(
        &self,
        viewer: &Actor,
        filter: &AuditFilter,
        page: u32,
        per_page: u32,
    ) -> Result<AuditPage, AuditError> {
        self.require_viewer(viewer).await?;
        validate_filter(filter)?;
        if page == 0 {
            return Err(AuditError::ValidationError("page starts at 1".to_string()));
        }
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let offset = (page as u64 - 1) * per_page as u64;

        let total = self.store.count(filter).await?;
        let logs = self.store.query(filter, per_page, offset).await?;

        Ok(AuditPage {
            logs,
            total,
            page,
            per_page,
        })
    }

    /// Write every entry matching `filter` to `out`, capped at
    /// [`MAX_EXPORT_ROWS`]. Entries appended while the export runs are not
    /// included.
    pub async fn export_logs<W: Write + Send>(
        &self,
        viewer: &Actor,
        filter: &AuditFilter,
        format: ExportFormat,
        out: W,
    ) -> Result<ExportSummary, AuditError> {
        self.require_viewer(viewer).await?;
        validate_filter(filter)?;

        let mut pinned = filter.clone();
        let snapshot_max = self.store.max_id().await?;
        pinned.max_id = match (filter.max_id, snapshot_max) {
            (Some(requested), Some(current)) => Some(requested.min(current)),
            (requested, current) => requested.or(current),
        };

        let mut sink = ExportSink::begin(format, out)?;
        let mut rows_written = 0usize;
        let mut truncated = false;

        if snapshot_max.is_some() {
            let mut offset = 0u64;
            loop {
                let batch = self.store.query(&pinned, EXPORT_PAGE_SIZE, offset).await?;
                let fetched = batch.len();
                for entry in &batch {
                    if rows_written == MAX_EXPORT_ROWS {
                        truncated = true;
                        break;
                    }
                    sink.write_entry(entry)?;
                    rows_written += 1;
                }
                if truncated || fetched < EXPORT_PAGE_SIZE as usize {
                    break;
                }
                offset += fetched as u64;
            }
        }

        sink.finish()?;

        if truncated {
            tracing::warn!(
                cap = MAX_EXPORT_ROWS,
                "Audit export truncated at the row cap"
            );
        }

        Ok(ExportSummary {
            rows_written,
            truncated,
        })
    }

    // ------------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------------

    /// Delete entries older than `retention_days`. This purge does not
    /// write an audit entry of its own.
    pub async fn cleanup_old_logs(&self, retention_days: u32) -> Result<u64, AuditError> {
        self.cleanup_old_logs_at(retention_days, Utc::now()).await
    }

    pub async fn cleanup_old_logs_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, AuditError> {
        if retention_days == 0 || retention_days > MAX_RETENTION_DAYS {
            return Err(AuditError::ValidationError(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        let cutoff = Duration::try_days(retention_days as i64)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| {
                AuditError::ValidationError(format!(
                    "retention_days {} reaches past the calendar",
                    retention_days
                ))
            })?;
        let removed = self.store.delete_older_than(cutoff).await?;

        tracing::info!(
            retention_days,
            removed,
            cutoff = %cutoff.to_rfc3339(),
            "Purged old audit entries"
        );

        Ok(removed)
    }

    async fn require_viewer(&self, viewer: &Actor) -> Result<(), AuditError> {
        if self
            .permissions
            .has_capability(viewer, Capability::ViewAuditLog)
            .await
        {
            Ok(())
        } else {
            Err(AuditError::PermissionDenied)
        }
    }
}

fn with_values(mut event: AuditEvent, old: Option<Value>, new: Option<Value>) -> AuditEvent {
    event.old_values = old;
    event.new_values = new;
    event
}

fn validate_filter(filter: &AuditFilter) -> Result<(), AuditError> {
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(AuditError::ValidationError(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }
    Ok(())
}

/// Addresses longer than an IPv6 literal are not addresses; drop them.
fn sanitize_ip(ip: Option<&str>) -> Option<String> {
    let ip = ip?.trim();
    if ip.is_empty() || ip.len() > MAX_IP_LEN {
        return None;
    }
    Some(ip.to_string())
}

fn truncate_user_agent(ua: &str) -> String {
    if ua.len() <= MAX_USER_AGENT_LEN {
        return ua.to_string();
    }
    let mut end = MAX_USER_AGENT_LEN;
    while !ua.is_char_boundary(end) {
        end -= 1;
    }
    ua[..end].to_string()
}
