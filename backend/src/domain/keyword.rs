//! Keyword aggregate: the tokens comments are monitored against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Page;

/// Minimum keyword length in characters.
pub const KEYWORD_WORD_MIN: usize = 1;
/// Maximum keyword length in characters.
pub const KEYWORD_WORD_MAX: usize = 100;
/// Maximum category length in characters.
pub const KEYWORD_CATEGORY_MAX: usize = 64;
/// Category assigned when none is supplied.
pub const DEFAULT_KEYWORD_CATEGORY: &str = "general";

/// Validation failures for keyword fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeywordValidationError {
    /// Blank word.
    #[error("keyword must not be empty")]
    EmptyWord,
    /// Word longer than [`KEYWORD_WORD_MAX`].
    #[error("keyword must be at most {max} characters")]
    WordTooLong {
        /// Upper bound.
        max: usize,
    },
    /// Blank category.
    #[error("category must not be empty")]
    EmptyCategory,
    /// Category longer than [`KEYWORD_CATEGORY_MAX`].
    #[error("category must be at most {max} characters")]
    CategoryTooLong {
        /// Upper bound.
        max: usize,
    },
}

/// Trimmed keyword text of 1 to 100 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "розыгрыш")]
pub struct KeywordWord(String);

impl KeywordWord {
    /// Validate a keyword.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KeywordValidationError> {
        let trimmed = raw.as_ref().trim();
        let length = trimmed.chars().count();
        if length < KEYWORD_WORD_MIN {
            return Err(KeywordValidationError::EmptyWord);
        }
        if length > KEYWORD_WORD_MAX {
            return Err(KeywordValidationError::WordTooLong {
                max: KEYWORD_WORD_MAX,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the word.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for KeywordWord {
    type Error = KeywordValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeywordWord> for String {
    fn from(value: KeywordWord) -> Self {
        value.0
    }
}

/// Lower-cased grouping label for keywords.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "general")]
pub struct KeywordCategory(String);

impl KeywordCategory {
    /// Validate a category label.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KeywordValidationError> {
        let normalized = raw.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(KeywordValidationError::EmptyCategory);
        }
        if normalized.chars().count() > KEYWORD_CATEGORY_MAX {
            return Err(KeywordValidationError::CategoryTooLong {
                max: KEYWORD_CATEGORY_MAX,
            });
        }
        Ok(Self(normalized))
    }

    /// Borrow the label.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for KeywordCategory {
    fn default() -> Self {
        Self(DEFAULT_KEYWORD_CATEGORY.to_owned())
    }
}

impl TryFrom<String> for KeywordCategory {
    type Error = KeywordValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeywordCategory> for String {
    fn from(value: KeywordCategory) -> Self {
        value.0
    }
}

/// Matching switches stored with each keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    /// Compare with exact case.
    pub case_sensitive: bool,
    /// Require non-alphanumeric boundaries on both sides.
    pub whole_word: bool,
}

/// Stored keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Primary key.
    pub id: Uuid,
    /// Monitored text.
    pub word: KeywordWord,
    /// Grouping label.
    pub category: KeywordCategory,
    /// Only active keywords take part in matching.
    pub is_active: bool,
    /// Matching switches.
    pub options: MatchOptions,
    /// Number of comments matched so far.
    pub match_count: i64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDraft {
    /// Monitored text.
    pub word: KeywordWord,
    /// Grouping label.
    pub category: KeywordCategory,
    /// Initial active flag.
    pub is_active: bool,
    /// Matching switches.
    pub options: MatchOptions,
}

/// Partial update for a keyword; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordPatch {
    /// New text.
    pub word: Option<KeywordWord>,
    /// New label.
    pub category: Option<KeywordCategory>,
    /// New active flag.
    pub is_active: Option<bool>,
    /// New case switch.
    pub case_sensitive: Option<bool>,
    /// New boundary switch.
    pub whole_word: Option<bool>,
}

impl KeywordPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.word.is_none()
            && self.category.is_none()
            && self.is_active.is_none()
            && self.case_sensitive.is_none()
            && self.whole_word.is_none()
    }
}

impl Keyword {
    /// Apply a partial update.
    pub fn apply(&mut self, patch: KeywordPatch, now: DateTime<Utc>) {
        let KeywordPatch {
            word,
            category,
            is_active,
            case_sensitive,
            whole_word,
        } = patch;
        if let Some(value) = word {
            self.word = value;
        }
        if let Some(value) = category {
            self.category = value;
        }
        if let Some(value) = is_active {
            self.is_active = value;
        }
        if let Some(value) = case_sensitive {
            self.options.case_sensitive = value;
        }
        if let Some(value) = whole_word {
            self.options.whole_word = value;
        }
        self.updated_at = now;
    }
}

/// Filters accepted by keyword listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    /// Only this category.
    pub category: Option<KeywordCategory>,
    /// Only active (or inactive) keywords.
    pub is_active: Option<bool>,
    /// Case-insensitive substring search over the word.
    pub search: Option<String>,
    /// Page bounds.
    pub page: Page,
}
