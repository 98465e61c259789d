//! PostgreSQL-backed `TaskRepository` implementation using Diesel ORM.
//!
//! Status transitions are written with a compare-and-set `UPDATE` so two
//! workers racing on the same task cannot both move it forward.

use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{TaskRepository, TaskRepositoryError};
use crate::domain::{Listing, Task, TaskFilter, TaskStatus};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_helpers::{corrupt_row, page_bounds};
use super::models::{NewTaskRow, TaskRow, TaskStateUpdate};
use super::pool::{DbPool, PoolError};
use super::schema::tasks;

/// Diesel-backed implementation of the `TaskRepository` port.
#[derive(Clone)]
pub struct DieselTaskRepository {
    pool: DbPool,
}

impl DieselTaskRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> TaskRepositoryError {
    map_basic_pool_error(error, TaskRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> TaskRepositoryError {
    map_basic_diesel_error(
        error,
        TaskRepositoryError::query,
        TaskRepositoryError::connection,
    )
}

fn row_to_task(row: TaskRow) -> Result<Task, TaskRepositoryError> {
    row.into_domain()
        .map_err(|message| TaskRepositoryError::query(corrupt_row("tasks", message)))
}

fn filtered(filter: &TaskFilter) -> tasks::BoxedQuery<'_, Pg> {
    let mut query = tasks::table.into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(tasks::status.eq(status.as_str()));
    }
    if let Some(task_type) = filter.task_type {
        query = query.filter(tasks::task_type.eq(task_type.as_str()));
    }
    if let Some(user) = filter.created_by {
        query = query.filter(tasks::created_by.eq(*user.as_uuid()));
    }
    query
}

fn guard_statuses(status: TaskStatus) -> Vec<&'static str> {
    status
        .predecessors()
        .iter()
        .map(|status| status.as_str())
        .collect()
}

#[async_trait]
impl TaskRepository for DieselTaskRepository {
    async fn insert(&self, task: &Task) -> Result<(), TaskRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(tasks::table)
            .values(NewTaskRow::from(task))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Task>, TaskRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<TaskRow> = tasks::table
            .find(id)
            .select(TaskRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_task).transpose()
    }

    async fn save(&self, task: &Task) -> Result<bool, TaskRepositoryError> {
        let allowed = guard_statuses(task.status);
        if allowed.is_empty() {
            return Ok(false);
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            tasks::table
                .filter(tasks::id.eq(task.id))
                .filter(tasks::status.eq_any(allowed)),
        )
        .set(TaskStateUpdate::from(task))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Listing<Task>, TaskRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (limit, offset) = page_bounds(&filter.page);

        let total: i64 = filtered(filter)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<TaskRow> = filtered(filter)
            .select(TaskRow::as_select())
            .order((tasks::created_at.desc(), tasks::id.desc()))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let items = rows
            .into_iter()
            .map(row_to_task)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::new(items, total))
    }

    async fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>, TaskRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let counts: Vec<(String, i64)> = tasks::table
            .group_by(tasks::status)
            .select((tasks::status, count_star()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        counts
            .into_iter()
            .map(|(status, count)| {
                status
                    .parse::<TaskStatus>()
                    .map(|status| (status, count))
                    .map_err(|message| TaskRepositoryError::query(corrupt_row("tasks", message)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    //! Guard and filter checks that do not need a database.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, &[])]
    #[case(TaskStatus::Processing, &["pending", "processing"])]
    fn guard_lists_predecessor_statuses(
        #[case] status: TaskStatus,
        #[case] expected: &[&'static str],
    ) {
        assert_eq!(guard_statuses(status), expected);
    }

    #[test]
    fn terminal_statuses_are_guarded_by_live_ones() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed] {
            let allowed = guard_statuses(terminal);
            assert!(!allowed.is_empty());
            assert!(!allowed.contains(&terminal.as_str()));
        }
    }

    #[test]
    fn status_filter_renders_bind() {
        let filter = TaskFilter {
            status: Some(TaskStatus::Failed),
            ..TaskFilter::default()
        };
        let rendered = diesel::debug_query::<Pg, _>(&filtered(&filter).select(tasks::id)).to_string();
        assert!(rendered.contains("\"tasks\".\"status\" = $1"));
    }
}
