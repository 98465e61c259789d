//! Shared `bb8` pool of multiplexed Redis connections.
//!
//! The refresh token store, the task status cache and the job queue all
//! check connections out of the same pool.

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection, RunError};
use bb8_redis::redis::{self, RedisError};

/// Errors raised while building or using the Redis pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedisPoolError {
    /// The pool could not be built.
    #[error("failed to build redis pool: {message}")]
    Build { message: String },
    /// No connection could be checked out.
    #[error("failed to get redis connection: {message}")]
    Checkout { message: String },
    /// A command failed because the connection broke.
    #[error("redis connection failed: {message}")]
    Connection { message: String },
    /// A command was rejected or returned an unexpected reply.
    #[error("redis command failed: {message}")]
    Command { message: String },
}

impl RedisPoolError {
    /// Whether the failure means Redis is unreachable rather than a bad
    /// command.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Build { .. } | Self::Checkout { .. } | Self::Connection { .. }
        )
    }

    /// Human-readable detail without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Build { message }
            | Self::Checkout { message }
            | Self::Connection { message }
            | Self::Command { message } => message,
        }
    }
}

impl From<RedisError> for RedisPoolError {
    fn from(error: RedisError) -> Self {
        let message = error.to_string();
        if error.is_io_error()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
            || error.is_timeout()
        {
            Self::Connection { message }
        } else {
            Self::Command { message }
        }
    }
}

impl From<RunError<RedisError>> for RedisPoolError {
    fn from(error: RunError<RedisError>) -> Self {
        Self::Checkout {
            message: error.to_string(),
        }
    }
}

/// Redis pool settings.
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    url: String,
    max_size: u32,
    connection_timeout: Duration,
}

impl RedisPoolConfig {
    /// Settings for `url` with sixteen connections and a five second
    /// checkout timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_size: 16,
            connection_timeout: Duration::from_secs(5),
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Set the checkout timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Cloneable handle to the Redis pool.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Build the pool.
    ///
    /// # Errors
    ///
    /// Returns [`RedisPoolError::Build`] for a malformed URL or when the
    /// first connection cannot be opened.
    pub async fn new(config: RedisPoolConfig) -> Result<Self, RedisPoolError> {
        let manager = RedisConnectionManager::new(config.url.as_str()).map_err(|err| {
            RedisPoolError::Build {
                message: err.to_string(),
            }
        })?;
        let inner = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|err| RedisPoolError::Build {
                message: err.to_string(),
            })?;
        Ok(Self { inner })
    }

    /// Check out a connection.
    pub async fn get(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, RedisPoolError> {
        Ok(self.inner.get().await?)
    }

    /// Round-trip a `PING` for readiness checks.
    pub async fn ping(&self) -> Result<(), RedisPoolError> {
        let mut conn = self.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}
