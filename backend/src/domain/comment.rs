//! Comment aggregate.
//!
//! A comment is either written by a local user through the API or ingested
//! from VK by the collection worker. Only locally authored comments have an
//! owner who may edit or delete them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::keyword_matcher::KeywordHit;
use super::user::UserId;

/// Minimum comment length in characters after trimming.
pub const COMMENT_TEXT_MIN: usize = 1;
/// Maximum comment length in characters.
pub const COMMENT_TEXT_MAX: usize = 1000;

/// Validation failures for [`CommentText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommentTextError {
    /// Blank text.
    #[error("comment text must not be empty")]
    Empty,
    /// Longer than [`COMMENT_TEXT_MAX`].
    #[error("comment text must be at most {max} characters")]
    TooLong {
        /// Upper bound in characters.
        max: usize,
    },
}

/// Comment body holding between 1 and 1000 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "Great post!")]
pub struct CommentText(String);

impl CommentText {
    /// Validate text submitted through the API.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CommentTextError> {
        let trimmed = raw.as_ref().trim();
        let length = trimmed.chars().count();
        if length < COMMENT_TEXT_MIN {
            return Err(CommentTextError::Empty);
        }
        if length > COMMENT_TEXT_MAX {
            return Err(CommentTextError::TooLong {
                max: COMMENT_TEXT_MAX,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Normalise text ingested from VK, truncating overlong bodies.
    ///
    /// Returns `None` for blank text (deleted or attachment-only comments).
    pub fn from_ingested(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.chars().take(COMMENT_TEXT_MAX).collect()))
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for CommentText {
    type Error = CommentTextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommentText> for String {
    fn from(value: CommentText) -> Self {
        value.0
    }
}

impl fmt::Display for CommentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who wrote the comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAuthor {
    /// Local account that created the comment through the API.
    User(UserId),
    /// VK account id of an ingested comment.
    Vk(i64),
}

impl CommentAuthor {
    /// Whether `user` owns this comment.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        matches!(self, Self::User(owner) if owner == user)
    }
}

/// Location of an ingested comment on VK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkCommentRef {
    /// Wall owner (negative for communities).
    pub owner_id: i64,
    /// Comment id within that wall.
    pub comment_id: i64,
}

/// Stored comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Primary key.
    pub id: Uuid,
    /// Body.
    pub text: CommentText,
    /// Local or VK author.
    pub author: CommentAuthor,
    /// Post the comment belongs to, if known.
    pub post_id: Option<Uuid>,
    /// VK coordinates for ingested comments.
    pub vk: Option<VkCommentRef>,
    /// Set once keyword analysis has run.
    pub analyzed: bool,
    /// Keywords found by the last analysis.
    pub matched_keywords: Vec<String>,
    /// Publication time on VK.
    pub published_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Replace the body and clear stale analysis results.
    pub fn revise(&mut self, text: CommentText, now: DateTime<Utc>) {
        self.text = text;
        self.analyzed = false;
        self.matched_keywords.clear();
        self.updated_at = now;
    }

    /// Record analysis output.
    pub fn mark_analyzed(&mut self, matched_keywords: Vec<String>, now: DateTime<Utc>) {
        self.analyzed = true;
        self.matched_keywords = matched_keywords;
        self.updated_at = now;
    }
}

/// Keyword matches recorded against one comment.
///
/// `words` is stored on the comment row. Each keyword in `keyword_ids` gains
/// one on its match counter when the matches are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentMatches {
    /// Matched keyword words as configured.
    pub words: Vec<String>,
    /// Matched keyword ids, one entry per keyword.
    pub keyword_ids: Vec<Uuid>,
}

impl CommentMatches {
    /// Collapse matcher output for a single comment.
    pub fn from_hits(hits: &[KeywordHit]) -> Self {
        Self {
            words: hits.iter().map(|hit| hit.word.clone()).collect(),
            keyword_ids: hits.iter().map(|hit| hit.keyword_id).collect(),
        }
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.keyword_ids.is_empty()
    }
}

/// Comment ready for insertion by the collection worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedComment {
    /// Identifier to assign.
    pub id: Uuid,
    /// Normalised body.
    pub text: CommentText,
    /// VK author id.
    pub vk_author_id: i64,
    /// Owning post.
    pub post_id: Uuid,
    /// VK coordinates used for deduplication.
    pub vk: VkCommentRef,
    /// Keywords matched at ingestion; the row is stored as analyzed.
    pub matches: CommentMatches,
    /// Publication time.
    pub published_at: Option<DateTime<Utc>>,
}

/// Filters accepted by comment listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentFilter {
    /// Only comments by this local user.
    pub author_id: Option<UserId>,
    /// Only comments on this post.
    pub post_id: Option<Uuid>,
    /// Only analyzed (or unanalyzed) comments.
    pub analyzed: Option<bool>,
    /// Only comments with (or without) keyword matches.
    pub has_matches: Option<bool>,
    /// Case-insensitive substring search over the text.
    pub search: Option<String>,
    /// Page bounds.
    pub page: super::Page,
}
