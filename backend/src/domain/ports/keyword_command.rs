//! Driving ports for keyword management.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Error, Keyword, KeywordCategory, KeywordDraft, KeywordFilter, KeywordPatch, Listing,
    MatchOptions, Principal,
};

/// Counts reported by bulk keyword creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkKeywordOutcome {
    /// Keywords inserted.
    pub created: usize,
    /// Blank, invalid or already existing entries.
    pub skipped: usize,
}

/// Admin-only keyword mutations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordCommand: Send + Sync {
    /// Create one keyword.
    async fn create(&self, principal: &Principal, draft: KeywordDraft) -> Result<Keyword, Error>;

    /// Create keywords from a newline-separated list.
    async fn bulk_create(
        &self,
        principal: &Principal,
        words: String,
        category: KeywordCategory,
        options: MatchOptions,
    ) -> Result<BulkKeywordOutcome, Error>;

    /// Apply a partial update.
    async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: KeywordPatch,
    ) -> Result<Keyword, Error>;

    /// Delete a keyword.
    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error>;
}

/// Keyword reads available to any authenticated user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordQuery: Send + Sync {
    /// Fetch one keyword.
    async fn get(&self, id: Uuid) -> Result<Keyword, Error>;

    /// Alphabetical listing.
    async fn list(&self, filter: KeywordFilter) -> Result<Listing<Keyword>, Error>;
}
