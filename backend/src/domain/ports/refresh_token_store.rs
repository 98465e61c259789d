//! Port for the per-user refresh token fingerprint.
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by refresh token stores.
    pub enum RefreshTokenStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "refresh token store connection failed: {message}",
        /// Command failed during execution.
        Query { message: String } => "refresh token store command failed: {message}",
    }
}

/// One active refresh token per user; writes replace the previous one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store `fingerprint` for `user_id`, expiring after `ttl`.
    async fn store(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError>;

    /// Fetch the current fingerprint.
    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RefreshTokenStoreError>;

    /// Drop the fingerprint, revoking the refresh token.
    async fn revoke(&self, user_id: &UserId) -> Result<(), RefreshTokenStoreError>;
}
