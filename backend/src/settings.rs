//! Runtime configuration loaded via OrthoConfig.
//!
//! Values merge CLI flags, `VKMON_*` environment variables and configuration
//! files. Both the HTTP server and the worker read the same settings; each
//! binary validates the parts it needs through the `require_*` helpers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{DEFAULT_BACKOFF_MS, DEFAULT_JOB_ATTEMPTS};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_POOL_SIZE: u32 = 10;
const DEFAULT_DB_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REDIS_PREFIX: &str = "vkmon";
const DEFAULT_REDIS_POOL_SIZE: u32 = 16;
const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_VK_API_URL: &str = "https://api.vk.com/method";
const DEFAULT_VK_API_VERSION: &str = "5.199";
const DEFAULT_VK_MIN_INTERVAL_MS: u64 = 350;
const DEFAULT_VK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VK_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_VK_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_QUEUE_LEASE_SECS: u64 = 600;
const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1_000;
const JWT_SECRET_MIN: usize = 32;
const REDACTED: &str = "<redacted>";

/// A required setting is missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Value was not supplied by any source.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    /// Value was supplied but rejected.
    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application settings shared by the server and the worker.
///
/// `Debug` output redacts the JWT secret, the VK token and the admin
/// password.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "VKMON")]
pub struct AppSettings {
    /// Interface the HTTP server binds to.
    pub host: Option<String>,
    /// Port the HTTP server binds to.
    pub port: Option<u16>,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum pooled PostgreSQL connections.
    pub db_pool_size: Option<u32>,
    /// Seconds to wait for a pooled connection.
    pub db_connection_timeout_secs: Option<u64>,
    /// Apply embedded migrations at startup.
    #[ortho_config(default = true)]
    pub run_migrations: bool,
    /// Redis connection string.
    pub redis_url: Option<String>,
    /// Prefix for every Redis key.
    pub redis_prefix: Option<String>,
    /// Maximum pooled Redis connections.
    pub redis_pool_size: Option<u32>,
    /// HS256 signing secret.
    pub jwt_secret: Option<String>,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: Option<u64>,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: Option<u64>,
    /// VK service or user access token.
    pub vk_access_token: Option<String>,
    /// VK API base URL.
    pub vk_api_url: Option<String>,
    /// VK API version sent as `v`.
    pub vk_api_version: Option<String>,
    /// Minimum gap between two VK calls.
    pub vk_min_interval_ms: Option<u64>,
    /// Per-request VK timeout.
    pub vk_timeout_secs: Option<u64>,
    /// Attempts per VK call before a retryable error fails the job attempt.
    pub vk_max_attempts: Option<u32>,
    /// First backoff between VK call attempts; doubles per attempt.
    pub vk_retry_backoff_ms: Option<u64>,
    /// Delivery attempts per job.
    pub queue_attempts: Option<u32>,
    /// Base backoff between job attempts.
    pub queue_backoff_ms: Option<u64>,
    /// Seconds a reserved job may run before it counts as stalled.
    pub queue_lease_secs: Option<u64>,
    /// Concurrent job handlers in the worker.
    pub worker_concurrency: Option<usize>,
    /// Idle wait between empty reserve attempts.
    pub worker_poll_interval_ms: Option<u64>,
    /// Bootstrap admin username.
    pub admin_username: Option<String>,
    /// Bootstrap admin email.
    pub admin_email: Option<String>,
    /// Bootstrap admin password.
    pub admin_password: Option<String>,
}

impl fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |value: &Option<String>| value.as_ref().map(|_| REDACTED);
        f.debug_struct("AppSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("db_pool_size", &self.db_pool_size)
            .field("db_connection_timeout_secs", &self.db_connection_timeout_secs)
            .field("run_migrations", &self.run_migrations)
            .field("redis_url", &self.redis_url)
            .field("redis_prefix", &self.redis_prefix)
            .field("redis_pool_size", &self.redis_pool_size)
            .field("jwt_secret", &secret(&self.jwt_secret))
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("vk_access_token", &secret(&self.vk_access_token))
            .field("vk_api_url", &self.vk_api_url)
            .field("vk_api_version", &self.vk_api_version)
            .field("vk_min_interval_ms", &self.vk_min_interval_ms)
            .field("vk_timeout_secs", &self.vk_timeout_secs)
            .field("vk_max_attempts", &self.vk_max_attempts)
            .field("vk_retry_backoff_ms", &self.vk_retry_backoff_ms)
            .field("queue_attempts", &self.queue_attempts)
            .field("queue_backoff_ms", &self.queue_backoff_ms)
            .field("queue_lease_secs", &self.queue_lease_secs)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("worker_poll_interval_ms", &self.worker_poll_interval_ms)
            .field("admin_username", &self.admin_username)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &secret(&self.admin_password))
            .finish()
    }
}

/// Credentials for the admin account created at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    /// Login name, trimmed.
    pub username: String,
    /// Contact address, trimmed.
    pub email: String,
    /// Plain password; hashed before it is stored.
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

fn required<'a>(value: Option<&'a String>, name: &'static str) -> Result<&'a str, SettingsError> {
    value
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .ok_or(SettingsError::Missing(name))
}

impl AppSettings {
    /// Socket address for the HTTP listener.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let ip = match self.host.as_deref().map(str::trim) {
            None | Some("") => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Some(raw) => raw.parse().map_err(|_| SettingsError::Invalid {
                name: "host",
                reason: format!("`{raw}` is not an IP address"),
            })?,
        };
        Ok(SocketAddr::new(ip, self.port.unwrap_or(DEFAULT_PORT)))
    }

    /// PostgreSQL connection string; required by both binaries.
    pub fn require_database_url(&self) -> Result<&str, SettingsError> {
        required(self.database_url.as_ref(), "database_url")
    }

    /// Pool size, at least one.
    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size.unwrap_or(DEFAULT_DB_POOL_SIZE).max(1)
    }

    /// Checkout timeout for pooled PostgreSQL connections.
    pub fn db_connection_timeout(&self) -> Duration {
        Duration::from_secs(
            self.db_connection_timeout_secs
                .unwrap_or(DEFAULT_DB_CONNECTION_TIMEOUT_SECS),
        )
    }

    /// Redis connection string; required by both binaries.
    pub fn require_redis_url(&self) -> Result<&str, SettingsError> {
        required(self.redis_url.as_ref(), "redis_url")
    }

    /// Key prefix, `vkmon` when unset or blank.
    pub fn redis_prefix(&self) -> &str {
        self.redis_prefix
            .as_deref()
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(DEFAULT_REDIS_PREFIX)
    }

    /// Redis pool size, at least one.
    pub fn redis_pool_size(&self) -> u32 {
        self.redis_pool_size.unwrap_or(DEFAULT_REDIS_POOL_SIZE).max(1)
    }

    /// Signing secret, rejected when shorter than 32 bytes.
    pub fn require_jwt_secret(&self) -> Result<&str, SettingsError> {
        let secret = required(self.jwt_secret.as_ref(), "jwt_secret")?;
        if secret.len() < JWT_SECRET_MIN {
            return Err(SettingsError::Invalid {
                name: "jwt_secret",
                reason: format!("must be at least {JWT_SECRET_MIN} bytes"),
            });
        }
        Ok(secret)
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs.unwrap_or(DEFAULT_ACCESS_TTL_SECS))
    }

    /// Refresh token lifetime.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs.unwrap_or(DEFAULT_REFRESH_TTL_SECS))
    }

    /// VK access token; only the worker needs it.
    pub fn require_vk_access_token(&self) -> Result<&str, SettingsError> {
        required(self.vk_access_token.as_ref(), "vk_access_token")
    }

    /// VK API base URL without a trailing slash.
    pub fn vk_api_url(&self) -> &str {
        self.vk_api_url
            .as_deref()
            .unwrap_or(DEFAULT_VK_API_URL)
            .trim_end_matches('/')
    }

    /// VK API version, `5.199` by default.
    pub fn vk_api_version(&self) -> &str {
        self.vk_api_version
            .as_deref()
            .unwrap_or(DEFAULT_VK_API_VERSION)
    }

    /// Minimum gap between two VK calls.
    pub fn vk_min_interval(&self) -> Duration {
        Duration::from_millis(self.vk_min_interval_ms.unwrap_or(DEFAULT_VK_MIN_INTERVAL_MS))
    }

    /// Per-request VK timeout.
    pub fn vk_timeout(&self) -> Duration {
        Duration::from_secs(self.vk_timeout_secs.unwrap_or(DEFAULT_VK_TIMEOUT_SECS))
    }

    /// Attempts per VK call, at least one.
    pub fn vk_max_attempts(&self) -> u32 {
        self.vk_max_attempts.unwrap_or(DEFAULT_VK_MAX_ATTEMPTS).max(1)
    }

    /// First backoff between VK call attempts.
    pub fn vk_retry_backoff(&self) -> Duration {
        Duration::from_millis(
            self.vk_retry_backoff_ms
                .unwrap_or(DEFAULT_VK_RETRY_BACKOFF_MS),
        )
    }

    /// Lease renewal period for running jobs: a quarter of the lease.
    pub fn worker_lease_renewal(&self) -> Duration {
        (self.queue_lease() / 4).max(Duration::from_secs(1))
    }

    /// Delivery attempts per job, at least one.
    pub fn queue_attempts(&self) -> u32 {
        self.queue_attempts.unwrap_or(DEFAULT_JOB_ATTEMPTS).max(1)
    }

    /// Base backoff between job attempts in milliseconds.
    pub fn queue_backoff_ms(&self) -> u64 {
        self.queue_backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS)
    }

    /// How long a reserved job may run without renewal.
    pub fn queue_lease(&self) -> Duration {
        Duration::from_secs(self.queue_lease_secs.unwrap_or(DEFAULT_QUEUE_LEASE_SECS))
    }

    /// Concurrent job loops, at least one.
    pub fn worker_concurrency(&self) -> usize {
        self.worker_concurrency
            .unwrap_or(DEFAULT_WORKER_CONCURRENCY)
            .max(1)
    }

    /// Idle wait between empty reserve attempts.
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.worker_poll_interval_ms
                .unwrap_or(DEFAULT_WORKER_POLL_INTERVAL_MS),
        )
    }

    /// Admin bootstrap credentials when all three are configured.
    ///
    /// A partial set is rejected so a typo does not silently skip the
    /// bootstrap.
    pub fn admin_bootstrap(&self) -> Result<Option<AdminBootstrap>, SettingsError> {
        let fields = [
            self.admin_username.as_deref(),
            self.admin_email.as_deref(),
            self.admin_password.as_deref(),
        ];
        match fields {
            [None, None, None] => Ok(None),
            [Some(username), Some(email), Some(password)] => Ok(Some(AdminBootstrap {
                username: username.trim().to_owned(),
                email: email.trim().to_owned(),
                password: password.to_owned(),
            })),
            _ => Err(SettingsError::Invalid {
                name: "admin_username",
                reason: "admin username, email and password must be set together".to_owned(),
            }),
        }
    }
}
