//! Driving port for post listings.
use async_trait::async_trait;

use crate::domain::{Error, Listing, Post, PostFilter};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostQuery: Send + Sync {
    /// Newest-first listing.
    async fn list(&self, filter: PostFilter) -> Result<Listing<Post>, Error>;
}
