// Domain models for the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Largest page `get_logs` will serve.
pub const MAX_PER_PAGE: u32 = 200;

/// Hard cap on the number of rows a single export writes.
pub const MAX_EXPORT_ROWS: usize = 10_000;

/// IPv6 textual maximum.
pub const MAX_IP_LEN: usize = 45;

/// User agents longer than this are truncated before storage.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Longest retention period accepted, in days (about a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

// ============================================================================
// ACTIONS & RESOURCES
// ============================================================================

/// Every action the audit trail knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "user.create")]
    UserCreate,
    #[serde(rename = "user.update")]
    UserUpdate,
    #[serde(rename = "user.delete")]
    UserDelete,
    #[serde(rename = "user.role_change")]
    UserRoleChange,
    #[serde(rename = "word.create")]
    WordCreate,
    #[serde(rename = "word.update")]
    WordUpdate,
    #[serde(rename = "word.delete")]
    WordDelete,
    #[serde(rename = "word.activate")]
    WordActivate,
    #[serde(rename = "word.deactivate")]
    WordDeactivate,
    #[serde(rename = "word.import")]
    WordImport,
    #[serde(rename = "word.bulk_delete")]
    WordBulkDelete,
    #[serde(rename = "moderation_level.change")]
    ModerationLevelChange,
    #[serde(rename = "moderation_settings.change")]
    ModerationSettingsChange,
    #[serde(rename = "article.create")]
    ArticleCreate,
    #[serde(rename = "article.update")]
    ArticleUpdate,
    #[serde(rename = "article.delete")]
    ArticleDelete,
    #[serde(rename = "article.status_change")]
    ArticleStatusChange,
    #[serde(rename = "cleanup.run")]
    CleanupRun,
    #[serde(rename = "cleanup.settings_change")]
    CleanupSettingsChange,
    #[serde(rename = "system.error")]
    SystemError,
    #[serde(rename = "api.call")]
    ApiCall,
}

impl AuditAction {
    pub const ALL: [AuditAction; 21] = [
        AuditAction::UserCreate,
        AuditAction::UserUpdate,
        AuditAction::UserDelete,
        AuditAction::UserRoleChange,
        AuditAction::WordCreate,
        AuditAction::WordUpdate,
        AuditAction::WordDelete,
        AuditAction::WordActivate,
        AuditAction::WordDeactivate,
        AuditAction::WordImport,
        AuditAction::WordBulkDelete,
        AuditAction::ModerationLevelChange,
        AuditAction::ModerationSettingsChange,
        AuditAction::ArticleCreate,
        AuditAction::ArticleUpdate,
        AuditAction::ArticleDelete,
        AuditAction::ArticleStatusChange,
        AuditAction::CleanupRun,
        AuditAction::CleanupSettingsChange,
        AuditAction::SystemError,
        AuditAction::ApiCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserCreate => "user.create",
            AuditAction::UserUpdate => "user.update",
            AuditAction::UserDelete => "user.delete",
            AuditAction::UserRoleChange => "user.role_change",
            AuditAction::WordCreate => "word.create",
            AuditAction::WordUpdate => "word.update",
            AuditAction::WordDelete => "word.delete",
            AuditAction::WordActivate => "word.activate",
            AuditAction::WordDeactivate => "word.deactivate",
            AuditAction::WordImport => "word.import",
            AuditAction::WordBulkDelete => "word.bulk_delete",
            AuditAction::ModerationLevelChange => "moderation_level.change",
            AuditAction::ModerationSettingsChange => "moderation_settings.change",
            AuditAction::ArticleCreate => "article.create",
            AuditAction::ArticleUpdate => "article.update",
            AuditAction::ArticleDelete => "article.delete",
            AuditAction::ArticleStatusChange => "article.status_change",
            AuditAction::CleanupRun => "cleanup.run",
            AuditAction::CleanupSettingsChange => "cleanup.settings_change",
            AuditAction::SystemError => "system.error",
            AuditAction::ApiCall => "api.call",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action '{}'", s))
    }
}

/// Kind of thing an audit entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    SensitiveWord,
    ModerationConfig,
    Article,
    Cleanup,
    System,
    Api,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "user",
            ResourceType::SensitiveWord => "sensitive_word",
            ResourceType::ModerationConfig => "moderation_config",
            ResourceType::Article => "article",
            ResourceType::Cleanup => "cleanup",
            ResourceType::System => "system",
            ResourceType::Api => "api",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-account changes reported by the host system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChange {
    Create,
    Update,
    Delete,
    RoleChange,
}

impl UserChange {
    pub fn action(&self) -> AuditAction {
        match self {
            UserChange::Create => AuditAction::UserCreate,
            UserChange::Update => AuditAction::UserUpdate,
            UserChange::Delete => AuditAction::UserDelete,
            UserChange::RoleChange => AuditAction::UserRoleChange,
        }
    }
}

/// Dictionary changes, mapped onto the `word.*` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordChange {
    Create,
    Update,
    Delete,
    Activate,
    Deactivate,
    Import,
    BulkDelete,
}

impl WordChange {
    pub fn action(&self) -> AuditAction {
        match self {
            WordChange::Create => AuditAction::WordCreate,
            WordChange::Update => AuditAction::WordUpdate,
            WordChange::Delete => AuditAction::WordDelete,
            WordChange::Activate => AuditAction::WordActivate,
            WordChange::Deactivate => AuditAction::WordDeactivate,
            WordChange::Import => AuditAction::WordImport,
            WordChange::BulkDelete => AuditAction::WordBulkDelete,
        }
    }
}

// ============================================================================
// EVENTS & ENTRIES
// ============================================================================

/// What happened, before the actor and timestamp are attached.
///
/// ```ignore
/// let event = AuditEvent::new(AuditAction::ArticleDelete)
///     .on(ResourceType::Article, Some(42))
///     .old_values(json!({ "title": "Hello" }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<i64>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            old_values: None,
            new_values: None,
        }
    }

    pub fn on(mut self, resource_type: ResourceType, resource_id: Option<i64>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = resource_id;
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }
}

/// A validated entry ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<i64>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored, immutable audit record.
///
/// `action` and `resource_type` are kept as strings so rows written by an
/// older build with an action this one no longer knows still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build the stored form of `entry` under the given id.
    pub fn from_new(id: i64, entry: NewAuditEntry) -> Self {
        Self {
            id,
            user_id: entry.user_id,
            action: entry.action.as_str().to_string(),
            resource_type: entry.resource_type.map(|r| r.as_str().to_string()),
            resource_id: entry.resource_id,
            old_values: entry.old_values,
            new_values: entry.new_values,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        }
    }
}

// ============================================================================
// QUERIES
// ============================================================================

/// Filters for `get_logs` and exports. Every field is optional and they
/// combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring over action, resource, values and IP.
    pub search: Option<String>,
    /// Upper id bound; exports pin this so rows appended mid-export are skipped.
    pub max_id: Option<i64>,
}

impl AuditFilter {
    /// In-process evaluation of the filter, used by the in-memory store.
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(user_id) = self.user_id {
            if entry.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if entry.resource_type.as_ref() != Some(resource_type) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.created_at > to {
                return false;
            }
        }
        if let Some(max_id) = self.max_id {
            if entry.id > max_id {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(entry.action.clone()),
                entry.resource_type.clone(),
                entry.resource_id.map(|id| id.to_string()),
                entry.old_values.as_ref().map(Value::to_string),
                entry.new_values.as_ref().map(Value::to_string),
                entry.ip_address.clone(),
            ];
            if !haystacks
                .iter()
                .flatten()
                .any(|h| h.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditLogEntry>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl AuditPage {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

/// Outcome of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows_written: usize,
    /// More rows matched than the export cap allowed.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: i64, action: AuditAction) -> AuditLogEntry {
        AuditLogEntry::from_new(
            id,
            NewAuditEntry {
                user_id: Some(5),
                action,
                resource_type: Some(ResourceType::Article),
                resource_id: Some(99),
                old_values: Some(json!({ "status": "draft" })),
                new_values: Some(json!({ "status": "pending_review" })),
                ip_address: Some("198.51.100.4".to_string()),
                user_agent: None,
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, json!(action.as_str()));
        }
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let e = entry(1, AuditAction::ArticleStatusChange);
        let filter = AuditFilter {
            search: Some("PENDING_REVIEW".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&e));

        let filter = AuditFilter {
            search: Some("published".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_filter_respects_max_id_and_user() {
        let e = entry(10, AuditAction::ArticleUpdate);
        let pinned = AuditFilter {
            max_id: Some(9),
            ..Default::default()
        };
        assert!(!pinned.matches(&e));

        let other_user = AuditFilter {
            user_id: Some(6),
            ..Default::default()
        };
        assert!(!other_user.matches(&e));
    }

    #[test]
    fn test_total_pages() {
        let page = AuditPage {
            logs: vec![],
            total: 41,
            page: 1,
            per_page: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
