//! Redis adapters: the shared connection pool, refresh token fingerprints
//! and the task status cache.
//!
//! Keys are namespaced under a configurable prefix so several deployments
//! can share one Redis instance.

mod pool;
mod refresh_token_store;
mod task_status_store;

pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError};
pub use refresh_token_store::RedisRefreshTokenStore;
pub use task_status_store::{RedisTaskStatusStore, TASK_STATUS_TTL};
