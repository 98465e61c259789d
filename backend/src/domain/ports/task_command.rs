//! Driving ports for task creation and status reads.
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    Error, Listing, Principal, Task, TaskFilter, TaskParameters, TaskPriority, TaskStatusSnapshot,
    UserId,
};

/// Raw enqueue request as received from clients.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueTaskRequest {
    /// One of the supported task types.
    pub task_type: String,
    /// Type-specific parameters.
    pub parameters: Value,
    /// Optional priority (1-10).
    pub priority: Option<u8>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskCommand: Send + Sync {
    /// Validate, persist and dispatch a task.
    async fn enqueue_task(
        &self,
        created_by: Option<UserId>,
        request: EnqueueTaskRequest,
    ) -> Result<Task, Error>;

    /// Persist a pending task without dispatching it.
    async fn create_task(
        &self,
        parameters: TaskParameters,
        priority: TaskPriority,
        created_by: Option<UserId>,
    ) -> Result<Task, Error>;

    /// Push the job for a persisted task onto its queue.
    async fn dispatch_task(&self, task: &Task) -> Result<(), Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskQuery: Send + Sync {
    /// Full task record; owner or admin only.
    async fn get(&self, principal: &Principal, id: Uuid) -> Result<Task, Error>;

    /// Status snapshot, cache first; owner or admin only.
    async fn status(&self, principal: &Principal, id: Uuid) -> Result<TaskStatusSnapshot, Error>;

    /// Newest-first listing; non-admins only see their own tasks.
    async fn list(&self, principal: &Principal, filter: TaskFilter) -> Result<Listing<Task>, Error>;
}
