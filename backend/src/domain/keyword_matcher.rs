//! Text matching against keywords.
//!
//! Two routines live here:
//! - [`analyze_default_keywords`] backs the per-comment analyze endpoint. It
//!   counts case-insensitive substring occurrences of a fixed word list and
//!   scores a comment by the number of distinct words found.
//! - [`KeywordMatcher`] matches text against the configured keywords,
//!   honouring each keyword's case and whole-word switches. The collection
//!   and analysis workers use it.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::keyword::{Keyword, MatchOptions};

/// Word list scored by [`analyze_default_keywords`].
pub const DEFAULT_ANALYSIS_KEYWORDS: [&str; 4] = ["спам", "реклама", "розыгрыш", "скидка"];

/// Result of the default keyword analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeywordAnalysis {
    /// Occurrences per default keyword, including zero counts.
    pub counts: BTreeMap<String, usize>,
    /// Number of distinct keywords with at least one occurrence.
    pub score: usize,
}

/// Count default keywords in `text`, ignoring case.
///
/// # Examples
/// ```
/// use vk_monitor::domain::analyze_default_keywords;
///
/// let analysis = analyze_default_keywords("СПАМ, спам и реклама");
/// assert_eq!(analysis.counts["спам"], 2);
/// assert_eq!(analysis.score, 2);
/// ```
pub fn analyze_default_keywords(text: &str) -> KeywordAnalysis {
    let folded = text.to_lowercase();
    let counts: BTreeMap<String, usize> = DEFAULT_ANALYSIS_KEYWORDS
        .iter()
        .map(|word| ((*word).to_owned(), folded.matches(word).count()))
        .collect();
    let score = counts.values().filter(|count| **count > 0).count();
    KeywordAnalysis { counts, score }
}

#[derive(Debug, Clone)]
struct MatchRule {
    keyword_id: Uuid,
    word: String,
    needle: String,
    options: MatchOptions,
}

/// A keyword found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    /// Matched keyword.
    pub keyword_id: Uuid,
    /// Keyword text as configured.
    pub word: String,
    /// Non-overlapping occurrences.
    pub occurrences: usize,
}

/// Matcher compiled from the active keyword set.
#[derive(Debug, Clone, Default)]
pub struct KeywordMatcher {
    rules: Vec<MatchRule>,
}

impl KeywordMatcher {
    /// Compile a matcher from keywords; inactive keywords are ignored.
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a Keyword>) -> Self {
        let rules = keywords
            .into_iter()
            .filter(|keyword| keyword.is_active)
            .map(|keyword| {
                let word = keyword.word.as_str().to_owned();
                let needle = if keyword.options.case_sensitive {
                    word.clone()
                } else {
                    word.to_lowercase()
                };
                MatchRule {
                    keyword_id: keyword.id,
                    word,
                    needle,
                    options: keyword.options,
                }
            })
            .collect();
        Self { rules }
    }

    /// Whether no active keywords were supplied.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find every keyword occurring in `text`.
    pub fn find(&self, text: &str) -> Vec<KeywordHit> {
        if self.rules.is_empty() {
            return Vec::new();
        }
        let folded = text.to_lowercase();
        self.rules
            .iter()
            .filter_map(|rule| {
                let haystack = if rule.options.case_sensitive {
                    text
                } else {
                    folded.as_str()
                };
                let occurrences = count_occurrences(haystack, &rule.needle, rule.options.whole_word);
                (occurrences > 0).then(|| KeywordHit {
                    keyword_id: rule.keyword_id,
                    word: rule.word.clone(),
                    occurrences,
                })
            })
            .collect()
    }
}

/// Accumulates per-keyword comment counts across a batch of matches.
#[derive(Debug, Default)]
pub struct KeywordHitTally {
    counts: HashMap<Uuid, i64>,
}

impl KeywordHitTally {
    /// Record the hits of one comment.
    pub fn record(&mut self, hits: &[KeywordHit]) {
        for hit in hits {
            *self.counts.entry(hit.keyword_id).or_insert(0) += 1;
        }
    }

    /// Total number of comment/keyword matches recorded.
    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    /// Comments recorded against one keyword.
    pub fn count_for(&self, keyword_id: &Uuid) -> i64 {
        self.counts.get(keyword_id).copied().unwrap_or(0)
    }
}

fn count_occurrences(haystack: &str, needle: &str, whole_word: bool) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(start, matched)| !whole_word || is_word_bounded(haystack, *start, matched.len()))
        .count()
}

fn is_word_bounded(haystack: &str, start: usize, len: usize) -> bool {
    let before = haystack.get(..start).and_then(|head| head.chars().next_back());
    let after = haystack
        .get(start + len..)
        .and_then(|tail| tail.chars().next());
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
