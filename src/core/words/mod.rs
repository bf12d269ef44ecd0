pub mod word_matcher;
pub mod word_models;
pub mod word_service;

pub use word_matcher::{contains_term, Dictionary};
pub use word_models::{
    BulkReport, ImportFailure, ImportReport, SensitiveWord, WordBulkAction, WordDraft, WordFilter,
    WordMatch, WordPage, WordPatch, WordStatistics, WordType, BUILTIN_HIGH_RISK, BUILTIN_NORMAL,
};
pub use word_service::{SensitiveWordService, WordError, WordStore};
