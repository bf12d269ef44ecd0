// Domain models for the article lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const MAX_TITLE_CHARS: usize = 200;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    PendingReview,
    Approved,
    Published,
    Rejected,
    Archived,
}

/// Knobs on the transition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Allow a moderator to publish straight from `pending_review`.
    pub allow_direct_publish: bool,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 6] = [
        ArticleStatus::Draft,
        ArticleStatus::PendingReview,
        ArticleStatus::Approved,
        ArticleStatus::Published,
        ArticleStatus::Rejected,
        ArticleStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::PendingReview => "pending_review",
            ArticleStatus::Approved => "approved",
            ArticleStatus::Published => "published",
            ArticleStatus::Rejected => "rejected",
            ArticleStatus::Archived => "archived",
        }
    }

    /// States reachable from this one in a single step.
    pub fn allowed_targets(&self, policy: TransitionPolicy) -> Vec<ArticleStatus> {
        use ArticleStatus::*;
        match self {
            Draft => vec![PendingReview],
            PendingReview if policy.allow_direct_publish => vec![Approved, Rejected, Published],
            PendingReview => vec![Approved, Rejected],
            Approved => vec![Published],
            Published | Rejected => vec![Archived],
            Archived => vec![],
        }
    }

    pub fn can_transition_to(&self, next: ArticleStatus, policy: TransitionPolicy) -> bool {
        self.allowed_targets(policy).contains(&next)
    }

    /// Statuses only moderators may move into or out of.
    pub fn is_moderated(&self) -> bool {
        matches!(
            self,
            ArticleStatus::Approved
                | ArticleStatus::Rejected
                | ArticleStatus::Published
                | ArticleStatus::Archived
        )
    }

    /// Entering this status requires the content to pass moderation.
    pub fn requires_content_check(&self) -> bool {
        matches!(
            self,
            ArticleStatus::PendingReview | ArticleStatus::Approved | ArticleStatus::Published
        )
    }

    /// Statuses an author may still edit or delete on their own.
    pub fn is_author_editable(&self) -> bool {
        matches!(self, ArticleStatus::Draft | ArticleStatus::PendingReview)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArticleStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown article status '{}'", s))
    }
}

/// Which timestamp an article's age is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBasis {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl AgeBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBasis::CreatedAt => "created_at",
            AgeBasis::UpdatedAt => "updated_at",
        }
    }

    pub fn timestamp_of(&self, article: &Article) -> DateTime<Utc> {
        match self {
            AgeBasis::CreatedAt => article.created_at,
            AgeBasis::UpdatedAt => article.updated_at,
        }
    }
}

impl FromStr for AgeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(AgeBasis::CreatedAt),
            "updated_at" => Ok(AgeBasis::UpdatedAt),
            other => Err(format!("unknown age basis '{}'", other)),
        }
    }
}

// ============================================================================
// ARTICLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: i64,
    pub status: ArticleStatus,
    /// Ordered and duplicate-free.
    pub tags: Vec<String>,
    pub moderation_notes: String,
    /// Bumped on every write; used for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Append a note on its own line.
    pub fn append_notes(&mut self, notes: &str) {
        let notes = notes.trim();
        if notes.is_empty() {
            return;
        }
        if !self.moderation_notes.is_empty() {
            self.moderation_notes.push('\n');
        }
        self.moderation_notes.push_str(notes);
    }

    pub fn audit_snapshot(&self) -> Value {
        json!({
            "title": self.title,
            "author_id": self.author_id,
            "status": self.status.as_str(),
            "tags": self.tags,
            "version": self.version,
        })
    }
}

/// What an author submits to create an article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    /// Go straight to `pending_review` instead of staying a draft.
    pub submit: bool,
}

/// A validated article ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: i64,
    pub status: ArticleStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ArticlePatch {
    pub fn touches_text(&self) -> bool {
        self.title.is_some() || self.content.is_some() || self.excerpt.is_some()
    }
}

/// Trim tags, drop blanks, keep the first occurrence of each.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

// ============================================================================
// LISTING & BATCHES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    pub author_id: Option<i64>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self {
            status: None,
            author_id: None,
            search: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl ArticleFilter {
    pub fn matches(&self, article: &Article) -> bool {
        self.status.map_or(true, |s| article.status == s)
            && self.author_id.map_or(true, |a| article.author_id == a)
            && self
                .search
                .as_deref()
                .filter(|s| !s.is_empty())
                .map_or(true, |s| article.title.to_lowercase().contains(&s.to_lowercase()))
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailureReason {
    NotFound,
    InvalidTransition,
    PermissionDenied,
    ModerationRejected,
    Conflict,
    Storage,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub article_id: i64,
    pub reason: BatchFailureReason,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStatusResult {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BatchFailure>,
}
