//! Redis-backed `RefreshTokenStore`.
//!
//! One key per user holds the SHA-256 fingerprint of the current refresh
//! token. Writing a new fingerprint replaces the old one, so only the most
//! recently issued refresh token stays usable.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use tracing::debug;

use crate::domain::UserId;
use crate::domain::ports::{RefreshTokenStore, RefreshTokenStoreError};

use super::pool::{RedisPool, RedisPoolError};

/// Refresh token fingerprints keyed `{prefix}:refresh:{user_id}`.
#[derive(Clone)]
pub struct RedisRefreshTokenStore {
    pool: RedisPool,
    prefix: String,
}

impl RedisRefreshTokenStore {
    /// Create a store writing under `prefix`.
    pub fn new(pool: RedisPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    fn key(&self, user_id: &UserId) -> String {
        refresh_key(&self.prefix, user_id)
    }
}

fn refresh_key(prefix: &str, user_id: &UserId) -> String {
    format!("{prefix}:refresh:{user_id}")
}

fn map_error(error: RedisPoolError) -> RefreshTokenStoreError {
    if error.is_connection() {
        RefreshTokenStoreError::connection(error.message())
    } else {
        RefreshTokenStoreError::query(error.message())
    }
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    async fn store(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError> {
        let mut conn = self.pool.get().await.map_err(map_error)?;
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.key(user_id), fingerprint, seconds)
            .await
            .map_err(|err| map_error(err.into()))?;
        debug!(user_id = %user_id, ttl_secs = seconds, "refresh token fingerprint stored");
        Ok(())
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RefreshTokenStoreError> {
        let mut conn = self.pool.get().await.map_err(map_error)?;
        conn.get::<_, Option<String>>(self.key(user_id))
            .await
            .map_err(|err| map_error(err.into()))
    }

    async fn revoke(&self, user_id: &UserId) -> Result<(), RefreshTokenStoreError> {
        let mut conn = self.pool.get().await.map_err(map_error)?;
        conn.del::<_, ()>(self.key(user_id))
            .await
            .map_err(|err| map_error(err.into()))?;
        debug!(user_id = %user_id, "refresh token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use uuid::Uuid;

    #[test]
    fn keys_are_namespaced_per_user() {
        let user = UserId::from_uuid(Uuid::nil());
        assert_eq!(
            refresh_key("vkmon", &user),
            "vkmon:refresh:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn connection_failures_stay_connection_errors() {
        let error = map_error(RedisPoolError::Checkout {
            message: "timed out".into(),
        });
        assert!(matches!(error, RefreshTokenStoreError::Connection { .. }));
    }
}
