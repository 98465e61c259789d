//! Read-only post listing use-case.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ports::{PostQuery, PostRepository, PostRepositoryError};
use crate::domain::{Error, Listing, Post, PostFilter};

fn map_repository_error(error: PostRepositoryError) -> Error {
    match error {
        PostRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("post repository unavailable: {message}"))
        }
        PostRepositoryError::Query { message } => {
            Error::internal(format!("post repository error: {message}"))
        }
    }
}

/// Post service implementing [`PostQuery`].
#[derive(Clone)]
pub struct PostService<R> {
    posts: Arc<R>,
}

impl<R> PostService<R> {
    /// Create a service over the post repository.
    pub fn new(posts: Arc<R>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl<R> PostQuery for PostService<R>
where
    R: PostRepository,
{
    async fn list(&self, filter: PostFilter) -> Result<Listing<Post>, Error> {
        self.posts.list(&filter).await.map_err(map_repository_error)
    }
}
