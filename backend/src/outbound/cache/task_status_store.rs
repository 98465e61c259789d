//! Redis-backed `TaskStatusStore`.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use uuid::Uuid;

use crate::domain::TaskStatusSnapshot;
use crate::domain::ports::{TaskStatusStore, TaskStatusStoreError};

use super::pool::{RedisPool, RedisPoolError};

/// Snapshots outlive their task by a day, then fall back to Postgres.
pub const TASK_STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// JSON snapshots keyed `{prefix}:task:{id}:status`.
#[derive(Clone)]
pub struct RedisTaskStatusStore {
    pool: RedisPool,
    prefix: String,
    ttl: Duration,
}

impl RedisTaskStatusStore {
    /// Create a store writing under `prefix` with the default TTL.
    pub fn new(pool: RedisPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            ttl: TASK_STATUS_TTL,
        }
    }

    fn key(&self, task_id: &Uuid) -> String {
        status_key(&self.prefix, task_id)
    }
}

fn status_key(prefix: &str, task_id: &Uuid) -> String {
    format!("{prefix}:task:{task_id}:status")
}

fn map_error(error: RedisPoolError) -> TaskStatusStoreError {
    if error.is_connection() {
        TaskStatusStoreError::connection(error.message())
    } else {
        TaskStatusStoreError::query(error.message())
    }
}

#[async_trait]
impl TaskStatusStore for RedisTaskStatusStore {
    async fn put(&self, snapshot: &TaskStatusSnapshot) -> Result<(), TaskStatusStoreError> {
        let body = serde_json::to_string(snapshot)
            .map_err(|err| TaskStatusStoreError::query(err.to_string()))?;
        let mut conn = self.pool.get().await.map_err(map_error)?;
        conn.set_ex::<_, _, ()>(self.key(&snapshot.task_id), body, self.ttl.as_secs())
            .await
            .map_err(|err| map_error(err.into()))
    }

    async fn get(
        &self,
        task_id: &Uuid,
    ) -> Result<Option<TaskStatusSnapshot>, TaskStatusStoreError> {
        let mut conn = self.pool.get().await.map_err(map_error)?;
        let body: Option<String> = conn
            .get(self.key(task_id))
            .await
            .map_err(|err| map_error(err.into()))?;
        body.map(|json| {
            serde_json::from_str(&json).map_err(|err| {
                TaskStatusStoreError::query(format!("undecodable task snapshot: {err}"))
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn keys_embed_task_id() {
        let id = Uuid::nil();
        assert_eq!(
            status_key("vkmon", &id),
            "vkmon:task:00000000-0000-0000-0000-000000000000:status"
        );
    }

    #[test]
    fn command_failures_become_query_errors() {
        let error = map_error(RedisPoolError::Command {
            message: "WRONGTYPE".into(),
        });
        assert!(matches!(error, TaskStatusStoreError::Query { .. }));
    }
}
