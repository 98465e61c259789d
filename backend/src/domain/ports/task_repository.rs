//! Port for task persistence.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Listing, Task, TaskFilter, TaskStatus};

use super::define_port_error;

define_port_error! {
    /// Errors raised by task repository adapters.
    pub enum TaskRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "task repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "task repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new pending task.
    async fn insert(&self, task: &Task) -> Result<(), TaskRepositoryError>;

    /// Fetch a task by id.
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Task>, TaskRepositoryError>;

    /// Persist the task if the stored status is one of
    /// `task.status.predecessors()`.
    ///
    /// Returns `false` when the guard rejected the write.
    async fn save(&self, task: &Task) -> Result<bool, TaskRepositoryError>;

    /// Newest-first listing.
    async fn list(&self, filter: &TaskFilter) -> Result<Listing<Task>, TaskRepositoryError>;

    /// Row counts per status.
    async fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>, TaskRepositoryError>;
}
