// Domain models for stale-article cleanup.

use crate::core::articles::{AgeBasis, Article, ArticleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Advisory lock name guarding cleanup runs.
pub const CLEANUP_LOCK_NAME: &str = "article_cleanup";

/// A lock not renewed for this long is treated as abandoned by a crashed run.
pub const LOCK_TTL_SECS: i64 = 3600;

/// Longest age threshold accepted, in days (about a century).
pub const MAX_THRESHOLD_DAYS: u32 = 36_500;

/// How many per-article failures are spelled out in a log's error message.
pub const MAX_LOGGED_FAILURES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupType {
    Auto,
    Manual,
}

impl CleanupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupType::Auto => "auto",
            CleanupType::Manual => "manual",
        }
    }
}

impl fmt::Display for CleanupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CleanupType::Auto),
            "manual" => Ok(CleanupType::Manual),
            other => Err(format!("unknown cleanup type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Running,
    Completed,
    Failed,
}

impl CleanupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::Running => "running",
            CleanupStatus::Completed => "completed",
            CleanupStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CleanupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(CleanupStatus::Running),
            "completed" => Ok(CleanupStatus::Completed),
            "failed" => Ok(CleanupStatus::Failed),
            other => Err(format!("unknown cleanup status '{}'", other)),
        }
    }
}

/// What is kept of an article after cleanup removed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedArticleSnapshot {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Article> for DeletedArticleSnapshot {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            author_id: article.author_id,
            status: article.status,
            created_at: article.created_at,
        }
    }
}

/// One cleanup run. Created as `running`; ends `completed` or `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupLog {
    pub id: i64,
    pub cleanup_type: CleanupType,
    pub triggered_by: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CleanupStatus,
    pub threshold_days: u32,
    pub articles_deleted: u64,
    pub deleted_articles: Vec<DeletedArticleSnapshot>,
    pub error_message: Option<String>,
}

/// Fields needed to open a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCleanupLog {
    pub cleanup_type: CleanupType,
    pub triggered_by: Option<i64>,
    pub threshold_days: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub article_id: i64,
    pub error: String,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub log_id: i64,
    pub status: CleanupStatus,
    pub articles_deleted: u64,
    pub deleted_articles: Vec<DeletedArticleSnapshot>,
    pub failures: Vec<CleanupFailure>,
}

/// Summarize failures for a log's error message: the first few, then a count.
pub fn summarize_failures(failures: &[CleanupFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let mut message = failures
        .iter()
        .take(MAX_LOGGED_FAILURES)
        .map(|f| format!("ID {}: {}", f.article_id, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    if failures.len() > MAX_LOGGED_FAILURES {
        message.push_str(&format!(
            "; and {} more",
            failures.len() - MAX_LOGGED_FAILURES
        ));
    }
    Some(message)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSettings {
    pub threshold_days: u32,
    pub auto_enabled: bool,
    pub eligible_statuses: Vec<ArticleStatus>,
    pub age_basis: AgeBasis,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            threshold_days: 30,
            auto_enabled: false,
            eligible_statuses: vec![
                ArticleStatus::Published,
                ArticleStatus::Rejected,
                ArticleStatus::Archived,
            ],
            age_basis: AgeBasis::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupLogFilter {
    pub cleanup_type: Option<CleanupType>,
    pub status: Option<CleanupStatus>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for CleanupLogFilter {
    fn default() -> Self {
        Self {
            cleanup_type: None,
            status: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl CleanupLogFilter {
    pub fn matches(&self, log: &CleanupLog) -> bool {
        self.cleanup_type.map_or(true, |t| log.cleanup_type == t)
            && self.status.map_or(true, |s| log.status == s)
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupLogPage {
    pub logs: Vec<CleanupLog>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStatistics {
    pub period_days: u32,
    pub total_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub articles_deleted: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl CleanupStatistics {
    pub fn tally<'a>(period_days: u32, logs: impl IntoIterator<Item = &'a CleanupLog>) -> Self {
        let mut stats = CleanupStatistics {
            period_days,
            ..Default::default()
        };
        for log in logs {
            stats.total_runs += 1;
            match log.status {
                CleanupStatus::Completed => stats.completed_runs += 1,
                CleanupStatus::Failed => stats.failed_runs += 1,
                CleanupStatus::Running => {}
            }
            stats.articles_deleted += log.articles_deleted;
            if stats.last_run_at.map_or(true, |last| log.started_at > last) {
                stats.last_run_at = Some(log.started_at);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_failures_caps_at_ten() {
        let failures: Vec<CleanupFailure> = (1..=12)
            .map(|id| CleanupFailure {
                article_id: id,
                error: "gone".to_string(),
            })
            .collect();

        let message = summarize_failures(&failures).unwrap();
        assert!(message.starts_with("ID 1: gone; ID 2: gone"));
        assert!(message.contains("ID 10: gone"));
        assert!(!message.contains("ID 11:"));
        assert!(message.ends_with("and 2 more"));

        assert_eq!(summarize_failures(&[]), None);
    }

    #[test]
    fn test_default_settings() {
        let settings = CleanupSettings::default();
        assert_eq!(settings.threshold_days, 30);
        assert!(!settings.auto_enabled);
        assert!(settings.eligible_statuses.contains(&ArticleStatus::Published));
        assert!(!settings.eligible_statuses.contains(&ArticleStatus::Draft));
        assert_eq!(settings.age_basis, AgeBasis::CreatedAt);
    }
}
