//! Port for the short-lived task status cache polled by clients.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::TaskStatusSnapshot;

use super::define_port_error;

define_port_error! {
    /// Errors raised by task status stores.
    pub enum TaskStatusStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "task status store connection failed: {message}",
        /// Command or decoding failed.
        Query { message: String } => "task status store command failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStatusStore: Send + Sync {
    /// Overwrite the snapshot for its task.
    async fn put(&self, snapshot: &TaskStatusSnapshot) -> Result<(), TaskStatusStoreError>;

    /// Read a snapshot if still cached.
    async fn get(&self, task_id: &Uuid)
    -> Result<Option<TaskStatusSnapshot>, TaskStatusStoreError>;
}

/// Store that caches nothing; reads fall through to the repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTaskStatusStore;

#[async_trait]
impl TaskStatusStore for NoOpTaskStatusStore {
    async fn put(&self, _snapshot: &TaskStatusSnapshot) -> Result<(), TaskStatusStoreError> {
        Ok(())
    }

    async fn get(
        &self,
        _task_id: &Uuid,
    ) -> Result<Option<TaskStatusSnapshot>, TaskStatusStoreError> {
        Ok(None)
    }
}
