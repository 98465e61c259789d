//! Driving ports for comment use-cases.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Comment, CommentFilter, CommentText, Error, KeywordAnalysis, Listing, Principal,
};

/// Mutating comment use-cases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentCommand: Send + Sync {
    /// Create a comment authored by `principal`.
    async fn create(
        &self,
        principal: &Principal,
        text: CommentText,
        post_id: Option<Uuid>,
    ) -> Result<Comment, Error>;

    /// Replace the text of a comment owned by `principal`.
    async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        text: CommentText,
    ) -> Result<Comment, Error>;

    /// Delete a comment owned by `principal`.
    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error>;

    /// Score a comment against the default keyword list and mark it analyzed.
    async fn analyze(&self, id: Uuid) -> Result<KeywordAnalysis, Error>;
}

/// Read-only comment use-cases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentQuery: Send + Sync {
    /// Fetch one comment.
    async fn get(&self, id: Uuid) -> Result<Comment, Error>;

    /// Newest-first listing.
    async fn list(&self, filter: CommentFilter) -> Result<Listing<Comment>, Error>;
}
