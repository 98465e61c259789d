//! Port for wall post persistence.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Listing, Post, PostFilter, PostUpsert};

use super::define_port_error;

define_port_error! {
    /// Errors raised by post repository adapters.
    pub enum PostRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "post repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "post repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert or refresh a post keyed by `(owner_id, vk_post_id)`; returns its id.
    async fn upsert(&self, post: &PostUpsert) -> Result<Uuid, PostRepositoryError>;

    /// Newest-first listing.
    async fn list(&self, filter: &PostFilter) -> Result<Listing<Post>, PostRepositoryError>;
}
