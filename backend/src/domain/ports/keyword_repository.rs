//! Port for keyword persistence.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Keyword, KeywordFilter, KeywordStats, Listing};

use super::define_port_error;

define_port_error! {
    /// Errors raised by keyword repository adapters.
    pub enum KeywordRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "keyword repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "keyword repository query failed: {message}",
        /// `(word, category)` already exists.
        Conflict { message: String } => "keyword already exists: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordRepository: Send + Sync {
    /// Insert one keyword; duplicates raise `Conflict`.
    async fn insert(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError>;

    /// Insert many keywords, silently skipping duplicates.
    ///
    /// Returns the number of rows inserted.
    async fn insert_many(&self, keywords: &[Keyword]) -> Result<usize, KeywordRepositoryError>;

    /// Fetch a keyword by id.
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Keyword>, KeywordRepositoryError>;

    /// Persist edited fields.
    async fn update(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError>;

    /// Delete a keyword. Returns `false` when nothing was deleted.
    async fn delete(&self, id: &Uuid) -> Result<bool, KeywordRepositoryError>;

    /// Alphabetical listing.
    async fn list(&self, filter: &KeywordFilter)
    -> Result<Listing<Keyword>, KeywordRepositoryError>;

    /// Every active keyword, for matching.
    async fn list_active(&self) -> Result<Vec<Keyword>, KeywordRepositoryError>;

    /// Dashboard totals and top `top` keywords by match count.
    async fn stats(&self, top: usize) -> Result<KeywordStats, KeywordRepositoryError>;
}
