//! Port for comment persistence.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Comment, CommentFilter, CommentMatches, CommentStats, IngestedComment, Listing,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by comment repository adapters.
    pub enum CommentRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "comment repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "comment repository query failed: {message}",
        /// A foreign key or unique constraint rejected the write.
        Conflict { message: String } => "comment conflicts with stored data: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a locally authored comment.
    async fn insert(&self, comment: &Comment) -> Result<(), CommentRepositoryError>;

    /// Insert ingested comments as analyzed, skipping ones already stored.
    ///
    /// Match counters of the keywords recorded on each inserted row are
    /// bumped in the same transaction, so a failed call leaves no trace and
    /// may be repeated. Returns the VK ids of the rows actually inserted.
    async fn insert_ingested(
        &self,
        comments: &[IngestedComment],
    ) -> Result<Vec<i64>, CommentRepositoryError>;

    /// Fetch a comment by id.
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Comment>, CommentRepositoryError>;

    /// Persist text, analysis and timestamp changes.
    async fn update(&self, comment: &Comment) -> Result<(), CommentRepositoryError>;

    /// Delete a comment. Returns `false` when nothing was deleted.
    async fn delete(&self, id: &Uuid) -> Result<bool, CommentRepositoryError>;

    /// Newest-first listing.
    async fn list(&self, filter: &CommentFilter)
    -> Result<Listing<Comment>, CommentRepositoryError>;

    /// Oldest unanalyzed comments, optionally restricted to posts.
    async fn list_unanalyzed(
        &self,
        post_ids: &[Uuid],
        limit: u32,
    ) -> Result<Vec<Comment>, CommentRepositoryError>;

    /// Store analysis output for one unanalyzed comment.
    ///
    /// Marks the comment analyzed and bumps the matched keywords' counters
    /// atomically. Returns `false`, leaving counters untouched, when the
    /// comment is gone or was already analyzed.
    async fn save_analysis(
        &self,
        id: &Uuid,
        matches: &CommentMatches,
        analyzed_at: DateTime<Utc>,
    ) -> Result<bool, CommentRepositoryError>;

    /// Dashboard totals.
    async fn stats(&self) -> Result<CommentStats, CommentRepositoryError>;
}
