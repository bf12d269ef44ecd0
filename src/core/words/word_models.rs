// Domain models for the sensitive-word dictionary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Longest term accepted, in characters.
pub const MAX_TERM_CHARS: usize = 100;

/// Longest replacement accepted, in characters.
pub const MAX_REPLACEMENT_CHARS: usize = 50;

/// Shipped high-risk terms, seeded as built-in words.
pub const BUILTIN_HIGH_RISK: [&str; 22] = [
    "暴力", "恐怖", "极端", "仇恨", "歧视", "诈骗", "赌博", "毒品", "色情", "淫秽", "反动",
    "分裂", "邪教", "恐怖主义", "暴力革命", "推翻政府", "武装起义", "血腥", "杀戮", "屠杀",
    "自杀", "自残",
];

/// Shipped normal terms, seeded as built-in words.
pub const BUILTIN_NORMAL: [&str; 16] = [
    "垃圾", "废物", "愚蠢", "白痴", "傻瓜", "混蛋", "笨蛋", "蠢货", "死鬼", "该死", "滚蛋",
    "闭嘴", "放屁", "胡说", "鬼话", "扯淡",
];

// ============================================================================
// WORD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordType {
    /// Ordinary profanity or spam markers. Usually masked.
    Normal,
    /// Content that must never be published.
    HighRisk,
}

impl WordType {
    pub const ALL: [WordType; 2] = [WordType::Normal, WordType::HighRisk];

    pub fn as_str(&self) -> &'static str {
        match self {
            WordType::Normal => "normal",
            WordType::HighRisk => "high_risk",
        }
    }

    /// Mask used when a word is stored without an explicit replacement.
    pub fn default_replacement(&self) -> &'static str {
        match self {
            WordType::Normal => "**",
            WordType::HighRisk => "***",
        }
    }
}

impl fmt::Display for WordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(WordType::Normal),
            "high_risk" => Ok(WordType::HighRisk),
            other => Err(format!("unknown word type '{}'", other)),
        }
    }
}

// ============================================================================
// WORDS
// ============================================================================

/// A dictionary entry. `(term, word_type)` is unique across the dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveWord {
    pub id: i64,
    pub term: String,
    pub word_type: WordType,
    pub replacement: String,
    pub is_builtin: bool,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SensitiveWord {
    /// The fields the audit trail records for a word.
    pub fn audit_snapshot(&self) -> Value {
        json!({
            "term": self.term,
            "word_type": self.word_type.as_str(),
            "replacement": self.replacement,
            "is_builtin": self.is_builtin,
            "is_active": self.is_active,
        })
    }
}

/// A fully validated word ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDraft {
    pub term: String,
    pub word_type: WordType,
    pub replacement: String,
    pub is_builtin: bool,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Partial update for `update_word`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordPatch {
    pub term: Option<String>,
    pub word_type: Option<WordType>,
    pub replacement: Option<String>,
    pub is_active: Option<bool>,
}

/// One occurrence of a dictionary term in scanned text.
///
/// `start..end` is a byte range into the original text, so
/// `&text[m.start..m.end] == m.matched_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordMatch {
    pub word_id: i64,
    /// The dictionary's spelling of the term.
    pub term: String,
    /// The text as it appeared in the input.
    pub matched_text: String,
    pub word_type: WordType,
    pub start: usize,
    pub end: usize,
}

// ============================================================================
// BULK RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub term: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub success_count: usize,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordBulkAction {
    Activate,
    Deactivate,
    Delete,
}

/// Result of a bulk operation over word ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub success_count: usize,
    pub failed_ids: Vec<i64>,
    pub errors: Vec<String>,
}

// ============================================================================
// LISTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordFilter {
    pub word_type: Option<WordType>,
    pub is_active: Option<bool>,
    pub is_builtin: Option<bool>,
    /// Case-insensitive substring of the term.
    pub search: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for WordFilter {
    fn default() -> Self {
        Self {
            word_type: None,
            is_active: None,
            is_builtin: None,
            search: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl WordFilter {
    pub fn matches(&self, word: &SensitiveWord) -> bool {
        self.word_type.map_or(true, |t| word.word_type == t)
            && self.is_active.map_or(true, |a| word.is_active == a)
            && self.is_builtin.map_or(true, |b| word.is_builtin == b)
            && self
                .search
                .as_deref()
                .filter(|s| !s.is_empty())
                .map_or(true, |s| word.term.to_lowercase().contains(&s.to_lowercase()))
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordPage {
    pub words: Vec<SensitiveWord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WordStatistics {
    pub total: u64,
    pub normal: u64,
    pub high_risk: u64,
    pub active: u64,
    pub inactive: u64,
    pub builtin: u64,
    pub custom: u64,
}

impl WordStatistics {
    /// Tally statistics from a full word listing.
    pub fn tally<'a>(words: impl IntoIterator<Item = &'a SensitiveWord>) -> Self {
        let mut stats = WordStatistics::default();
        for word in words {
            stats.total += 1;
            match word.word_type {
                WordType::Normal => stats.normal += 1,
                WordType::HighRisk => stats.high_risk += 1,
            }
            if word.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            if word.is_builtin {
                stats.builtin += 1;
            } else {
                stats.custom += 1;
            }
        }
        stats
    }
}
