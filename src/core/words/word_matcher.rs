// Case-insensitive dictionary scanning.
//
// Pure functions over an immutable snapshot of the active dictionary. Text is
// compared char by char after simple lowercasing, and every reported offset
// is a byte offset into the caller's original string.

use super::word_models::{SensitiveWord, WordMatch, WordType};

/// Lowercase `c` when that maps to exactly one char.
///
/// Chars whose lowercase form expands (e.g. 'İ') are compared as-is so a
/// normalized position always lines up with one original char.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn fold_str(s: &str) -> Vec<char> {
    s.chars().map(fold).collect()
}

struct Entry {
    word: SensitiveWord,
    pattern: Vec<char>,
}

/// Immutable snapshot of active words, ordered longest pattern first.
pub struct Dictionary {
    entries: Vec<Entry>,
}

impl Dictionary {
    /// Build a snapshot from `words`. Inactive and empty terms are skipped.
    pub fn new(words: impl IntoIterator<Item = SensitiveWord>) -> Self {
        let mut entries: Vec<Entry> = words
            .into_iter()
            .filter(|w| w.is_active && !w.term.is_empty())
            .map(|word| Entry {
                pattern: fold_str(&word.term),
                word,
            })
            .collect();

        // Longest first; at equal length high_risk wins, then lowest id.
        entries.sort_by(|a, b| {
            b.pattern
                .len()
                .cmp(&a.pattern.len())
                .then_with(|| type_rank(b.word.word_type).cmp(&type_rank(a.word.word_type)))
                .then_with(|| a.word.id.cmp(&b.word.id))
        });

        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every occurrence of an active term of one of `types`, overlaps included.
    ///
    /// Ordered by start offset, then longer match first, then high_risk first.
    pub fn find_matches(&self, text: &str, types: &[WordType]) -> Vec<WordMatch> {
        let scan = Scan::new(text);
        let mut found = Vec::new();

        for pos in 0..scan.folded.len() {
            for entry in self.entries.iter().filter(|e| types.contains(&e.word.word_type)) {
                if let Some(end_pos) = scan.match_at(pos, &entry.pattern) {
                    let start = scan.byte_offset(pos);
                    let end = scan.byte_offset(end_pos);
                    found.push(WordMatch {
                        word_id: entry.word.id,
                        term: entry.word.term.clone(),
                        matched_text: text[start..end].to_string(),
                        word_type: entry.word.word_type,
                        start,
                        end,
                    });
                }
            }
        }

        found
    }

    /// Whether any active term of one of `types` occurs in `text`.
    pub fn contains_any(&self, text: &str, types: &[WordType]) -> bool {
        let scan = Scan::new(text);
        (0..scan.folded.len()).any(|pos| {
            self.entries
                .iter()
                .filter(|e| types.contains(&e.word.word_type))
                .any(|e| scan.match_at(pos, &e.pattern).is_some())
        })
    }

    /// Replace occurrences of terms of `types` with their replacement.
    ///
    /// Single left-to-right pass: at each position the longest matching term
    /// wins and scanning resumes after it, so replaced spans never overlap.
    pub fn replace(&self, text: &str, types: &[WordType]) -> String {
        let scan = Scan::new(text);
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while pos < scan.folded.len() {
            let hit = self
                .entries
                .iter()
                .filter(|e| types.contains(&e.word.word_type))
                .find_map(|e| scan.match_at(pos, &e.pattern).map(|end| (e, end)));

            match hit {
                Some((entry, end_pos)) => {
                    out.push_str(&entry.word.replacement);
                    pos = end_pos;
                }
                None => {
                    let start = scan.byte_offset(pos);
                    let end = scan.byte_offset(pos + 1);
                    out.push_str(&text[start..end]);
                    pos += 1;
                }
            }
        }

        out
    }
}

/// Case-insensitive substring test used for whitelist and blacklist terms.
pub fn contains_term(text: &str, term: &str) -> bool {
    let pattern = fold_str(term);
    if pattern.is_empty() {
        return false;
    }
    let scan = Scan::new(text);
    (0..scan.folded.len()).any(|pos| scan.match_at(pos, &pattern).is_some())
}

fn type_rank(word_type: WordType) -> u8 {
    match word_type {
        WordType::Normal => 0,
        WordType::HighRisk => 1,
    }
}

/// Folded view of a text with the byte offset of every char.
struct Scan<'a> {
    text: &'a str,
    folded: Vec<char>,
    offsets: Vec<usize>,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        let (offsets, folded): (Vec<usize>, Vec<char>) =
            text.char_indices().map(|(i, c)| (i, fold(c))).unzip();
        Self {
            text,
            folded,
            offsets,
        }
    }

    /// Char index one past the match if `pattern` occurs at `pos`.
    fn match_at(&self, pos: usize, pattern: &[char]) -> Option<usize> {
        let end = pos + pattern.len();
        if end <= self.folded.len() && self.folded[pos..end] == *pattern {
            Some(end)
        } else {
            None
        }
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.offsets.get(char_pos).copied().unwrap_or(self.text.len())
    }
}
