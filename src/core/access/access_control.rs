// Access control primitives shared by every feature.
//
// The core never decides *who* is a moderator. That is the job of whatever
// implements `PermissionChecker` (a role table, an identity provider...).
// The core only knows which capability each operation needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A permission an acting user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Review, approve, reject, publish and archive articles.
    ModerateArticles,
    /// Maintain the sensitive-word dictionary.
    ManageWords,
    /// Change moderation and cleanup settings.
    ManageSettings,
    /// Trigger a manual cleanup run.
    RunCleanup,
    /// Read and export the audit trail.
    ViewAuditLog,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ModerateArticles,
        Capability::ManageWords,
        Capability::ManageSettings,
        Capability::RunCleanup,
        Capability::ViewAuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ModerateArticles => "moderate_articles",
            Capability::ManageWords => "manage_words",
            Capability::ManageSettings => "manage_settings",
            Capability::RunCleanup => "run_cleanup",
            Capability::ViewAuditLog => "view_audit_log",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is performing an operation, plus the request metadata the audit
/// trail records alongside it.
///
/// `user_id == None` means the system itself (scheduled jobs, migrations).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn system() -> Self {
        Self::default()
    }

    /// Attach the originating request's address and user agent.
    pub fn with_request(
        mut self,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }

    /// Whether this actor is the given author.
    pub fn owns(&self, author_id: i64) -> bool {
        self.user_id == Some(author_id)
    }
}

/// Port for the permission collaborator.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether `actor` holds `capability`. The system actor is handled by the
    /// implementation like any other caller.
    async fn has_capability(&self, actor: &Actor, capability: Capability) -> bool;
}
