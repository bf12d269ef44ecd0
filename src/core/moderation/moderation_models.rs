// Domain models for content moderation.

use crate::core::words::WordType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// LEVELS
// ============================================================================

/// How strictly submissions are screened.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModerationLevel {
    /// Only high-risk terms block; everything else passes untouched.
    Lenient,
    /// High-risk terms block, normal terms are masked.
    #[default]
    Default,
    /// Any dictionary hit blocks the submission.
    Strict,
}

/// What a level does with each word type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelStrategy {
    pub block_high_risk: bool,
    pub block_normal: bool,
    pub replace_high_risk: bool,
    pub replace_normal: bool,
    /// Whether text containing any scanned term may still be submitted.
    pub allow_submission: bool,
}

impl LevelStrategy {
    pub fn blocks(&self, word_type: WordType) -> bool {
        match word_type {
            WordType::Normal => self.block_normal,
            WordType::HighRisk => self.block_high_risk,
        }
    }

    pub fn replaces(&self, word_type: WordType) -> bool {
        match word_type {
            WordType::Normal => self.replace_normal,
            WordType::HighRisk => self.replace_high_risk,
        }
    }

    /// Word types the local stage needs to look for at all.
    pub fn scanned_types(&self) -> Vec<WordType> {
        WordType::ALL
            .into_iter()
            .filter(|t| self.blocks(*t) || self.replaces(*t))
            .collect()
    }

    /// Word types the replacement pass rewrites.
    pub fn replaced_types(&self) -> Vec<WordType> {
        WordType::ALL
            .into_iter()
            .filter(|t| self.replaces(*t))
            .collect()
    }
}

impl ModerationLevel {
    pub const ALL: [ModerationLevel; 3] = [
        ModerationLevel::Lenient,
        ModerationLevel::Default,
        ModerationLevel::Strict,
    ];

    pub const fn strategy(&self) -> LevelStrategy {
        match self {
            ModerationLevel::Lenient => LevelStrategy {
                block_high_risk: true,
                block_normal: false,
                replace_high_risk: false,
                replace_normal: false,
                allow_submission: true,
            },
            ModerationLevel::Default => LevelStrategy {
                block_high_risk: true,
                block_normal: false,
                replace_high_risk: false,
                replace_normal: true,
                allow_submission: true,
            },
            ModerationLevel::Strict => LevelStrategy {
                block_high_risk: true,
                block_normal: true,
                replace_high_risk: false,
                replace_normal: false,
                allow_submission: false,
            },
        }
    }

    /// Strictness passed to the external classifier (1 = lenient, 3 = strict).
    pub fn strict_level(&self) -> u8 {
        match self {
            ModerationLevel::Lenient => 1,
            ModerationLevel::Default => 2,
            ModerationLevel::Strict => 3,
        }
    }

    /// Orders levels from lenient to strict.
    pub fn compare_strictness(&self, other: &ModerationLevel) -> Ordering {
        self.strict_level().cmp(&other.strict_level())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationLevel::Lenient => "lenient",
            ModerationLevel::Default => "default",
            ModerationLevel::Strict => "strict",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModerationLevel::Lenient => "Blocks high-risk terms only",
            ModerationLevel::Default => "Blocks high-risk terms and masks normal terms",
            ModerationLevel::Strict => "Blocks any sensitive term",
        }
    }
}

impl fmt::Display for ModerationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lenient" => Ok(ModerationLevel::Lenient),
            "default" => Ok(ModerationLevel::Default),
            "strict" => Ok(ModerationLevel::Strict),
            other => Err(format!("unknown moderation level '{}'", other)),
        }
    }
}

// ============================================================================
// VERDICTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a 0..1 score the way classifier scores are read.
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            RiskLevel::High
        } else if score > 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Pass,
    PassWithReplacement,
    Reject,
}

/// Outcome of moderating one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationVerdict {
    pub passed: bool,
    pub disposition: Disposition,
    /// 0.0 (clean) to 1.0 (certainly violating).
    pub score: f64,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub suggestions: Vec<String>,
    /// Distinct terms in first-seen order.
    pub flagged_keywords: Vec<String>,
    /// The rewritten text when the disposition is `PassWithReplacement`.
    pub text: Option<String>,
    pub level: ModerationLevel,
    pub classifier_consulted: bool,
}

impl ModerationVerdict {
    pub fn pass(level: ModerationLevel) -> Self {
        Self {
            passed: true,
            disposition: Disposition::Pass,
            score: 0.0,
            risk_level: RiskLevel::Low,
            reasons: Vec::new(),
            suggestions: Vec::new(),
            flagged_keywords: Vec::new(),
            text: None,
            level,
            classifier_consulted: false,
        }
    }

    pub fn reject(level: ModerationLevel, reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            disposition: Disposition::Reject,
            score: 0.8,
            risk_level: RiskLevel::High,
            reasons: vec![reason.into()],
            ..Self::pass(level)
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.disposition == Disposition::Reject
    }

    /// The text to store: the rewritten text if any, else `original`.
    pub fn final_text<'a>(&'a self, original: &'a str) -> &'a str {
        self.text.as_deref().unwrap_or(original)
    }
}

// ============================================================================
// EXTERNAL CLASSIFIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Political,
    Violence,
    Sexual,
    Hate,
    Spam,
    Privacy,
}

impl CheckType {
    pub const ALL: [CheckType; 6] = [
        CheckType::Political,
        CheckType::Violence,
        CheckType::Sexual,
        CheckType::Hate,
        CheckType::Spam,
        CheckType::Privacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Political => "political",
            CheckType::Violence => "violence",
            CheckType::Sexual => "sexual",
            CheckType::Hate => "hate",
            CheckType::Spam => "spam",
            CheckType::Privacy => "privacy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOptions {
    /// 1 (lenient) to 3 (strict).
    pub strict_level: u8,
    pub check_types: Vec<CheckType>,
}

impl ClassifierOptions {
    pub fn for_level(level: ModerationLevel) -> Self {
        Self {
            strict_level: level.strict_level(),
            check_types: CheckType::ALL.to_vec(),
        }
    }
}

/// What an external classifier said about a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub passed: bool,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub suggestions: Vec<String>,
    pub flagged_keywords: Vec<String>,
}

/// Timeout and retry budget for classifier calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// Per attempt.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub base_backoff: Duration,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl ClassifierPolicy {
    /// Delay after failed attempt number `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Site-wide moderation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationSettings {
    pub level: ModerationLevel,
    /// Texts containing any of these terms skip every check.
    pub whitelist_terms: Vec<String>,
    /// Texts containing any of these terms are rejected outright.
    pub blacklist_terms: Vec<String>,
    /// Users whose texts are never moderated.
    pub bypass_users: Vec<i64>,
    /// Whether the external classifier is consulted when one is configured.
    pub use_classifier: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<i64>,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            level: ModerationLevel::Default,
            whitelist_terms: Vec::new(),
            blacklist_terms: Vec::new(),
            bypass_users: Vec::new(),
            use_classifier: true,
            updated_at: None,
            updated_by: None,
        }
    }
}

impl ModerationSettings {
    /// Trim list entries and drop blanks and duplicates.
    pub fn normalized(mut self) -> Self {
        self.whitelist_terms = normalize_terms(self.whitelist_terms);
        self.blacklist_terms = normalize_terms(self.blacklist_terms);
        let mut seen = std::collections::HashSet::new();
        self.bypass_users.retain(|id| seen.insert(*id));
        self
    }
}

fn normalize_terms(terms: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        let term = term.trim();
        if !term.is_empty() && !out.iter().any(|t| t == term) {
            out.push(term.to_string());
        }
    }
    out
}

/// A human-readable summary of the rules in force at a level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationRules {
    pub level: ModerationLevel,
    pub description: &'static str,
    pub strategy: LevelStrategy,
    pub whitelist_terms: Vec<String>,
    pub blacklist_terms: Vec<String>,
    pub bypass_users: Vec<i64>,
    pub classifier_enabled: bool,
}

// ============================================================================
// ARTICLE & BATCH RESULTS
// ============================================================================

/// Result of moderating an article's text fields together.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleModeration {
    pub verdict: ModerationVerdict,
    /// Field values to store; rewritten when the verdict replaced terms.
    pub title: String,
    pub content: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub replaced: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchModeration {
    pub verdicts: Vec<ModerationVerdict>,
    pub summary: BatchSummary,
}
