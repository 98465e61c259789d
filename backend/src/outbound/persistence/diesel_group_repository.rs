//! PostgreSQL-backed `GroupRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use uuid::Uuid;

use crate::domain::ports::{GroupRepository, GroupRepositoryError};
use crate::domain::{Group, GroupFilter, GroupResolution, GroupStatus, Listing};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_helpers::{corrupt_row, page_bounds};
use super::models::{GroupResolutionUpdate, GroupRow, NewGroupRow};
use super::pool::{DbPool, PoolError};
use super::schema::groups;

/// Transaction-scoped advisory lock taken while resolutions are written.
///
/// Serialises the "already valid" check with the writes across workers;
/// `groups_valid_vk_group_id_key` backs it up at the schema level.
const RESOLUTION_LOCK_KEY: i64 = 0x766b_6d6f_6e00_0001;

/// Diesel-backed implementation of the `GroupRepository` port.
#[derive(Clone)]
pub struct DieselGroupRepository {
    pool: DbPool,
}

impl DieselGroupRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> GroupRepositoryError {
    map_basic_pool_error(error, GroupRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> GroupRepositoryError {
    map_basic_diesel_error(
        error,
        GroupRepositoryError::query,
        GroupRepositoryError::connection,
    )
}

fn row_to_group(row: GroupRow) -> Result<Group, GroupRepositoryError> {
    row.into_domain()
        .map_err(|message| GroupRepositoryError::query(corrupt_row("groups", message)))
}

fn collect_groups(rows: Vec<GroupRow>) -> Result<Vec<Group>, GroupRepositoryError> {
    rows.into_iter().map(row_to_group).collect()
}

fn filtered(filter: &GroupFilter) -> groups::BoxedQuery<'_, Pg> {
    let mut query = groups::table.into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(groups::status.eq(status.as_str()));
    }
    if let Some(task_id) = filter.upload_task_id {
        query = query.filter(groups::upload_task_id.eq(task_id));
    }
    query
}

#[async_trait]
impl GroupRepository for DieselGroupRepository {
    async fn insert_many(&self, groups: &[Group]) -> Result<(), GroupRepositoryError> {
        if groups.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<NewGroupRow<'_>> = groups.iter().map(NewGroupRow::from).collect();
        diesel::insert_into(groups::table)
            .values(&rows)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Group>, GroupRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<GroupRow> = groups::table
            .find(id)
            .select(GroupRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_group).transpose()
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Group>, GroupRepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<GroupRow> = groups::table
            .filter(groups::id.eq_any(ids))
            .select(GroupRow::as_select())
            .order(groups::created_at.asc())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        collect_groups(rows)
    }

    async fn find_valid_matching(
        &self,
        screen_names: &[String],
        vk_group_ids: &[i64],
    ) -> Result<Vec<Group>, GroupRepositoryError> {
        if screen_names.is_empty() && vk_group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<GroupRow> = groups::table
            .filter(groups::status.eq(GroupStatus::Valid.as_str()))
            .filter(
                groups::screen_name
                    .eq_any(screen_names)
                    .or(groups::vk_group_id.eq_any(vk_group_ids)),
            )
            .select(GroupRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        collect_groups(rows)
    }

    async fn apply_resolutions(
        &self,
        resolutions: &[GroupResolution],
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<GroupResolution>, GroupRepositoryError> {
        if resolutions.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                    .bind::<BigInt, _>(RESOLUTION_LOCK_KEY)
                    .execute(conn)
                    .await?;
                let mut stored = Vec::with_capacity(resolutions.len());
                for resolution in resolutions {
                    let mut resolution = resolution.clone();
                    if let Some(vk_id) = resolution.claims_community() {
                        let held: i64 = groups::table
                            .filter(groups::status.eq(GroupStatus::Valid.as_str()))
                            .filter(groups::vk_group_id.eq(vk_id))
                            .filter(groups::id.ne(resolution.group_id))
                            .count()
                            .get_result(conn)
                            .await?;
                        if held > 0 {
                            resolution = resolution.into_duplicate();
                        }
                    }
                    let changes = GroupResolutionUpdate {
                        status: resolution.status.as_str(),
                        vk_group_id: resolution.vk_group_id,
                        name: resolution.name.as_deref(),
                        status_reason: resolution.status_reason.as_deref(),
                        updated_at,
                    };
                    diesel::update(groups::table.find(resolution.group_id))
                        .set(&changes)
                        .execute(conn)
                        .await?;
                    stored.push(resolution);
                }
                Ok(stored)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, GroupRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(groups::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn list(&self, filter: &GroupFilter) -> Result<Listing<Group>, GroupRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (limit, offset) = page_bounds(&filter.page);

        let total: i64 = filtered(filter)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<GroupRow> = filtered(filter)
            .select(GroupRow::as_select())
            .order((groups::created_at.desc(), groups::id.desc()))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(Listing::new(collect_groups(rows)?, total))
    }

    async fn count_by_status(&self) -> Result<Vec<(GroupStatus, i64)>, GroupRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let counts: Vec<(String, i64)> = groups::table
            .group_by(groups::status)
            .select((groups::status, count_star()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        counts
            .into_iter()
            .map(|(status, count)| {
                status
                    .parse::<GroupStatus>()
                    .map(|status| (status, count))
                    .map_err(|message| GroupRepositoryError::query(corrupt_row("groups", message)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    //! SQL shape checks for listing filters.
    use super::*;
    use diesel::debug_query;

    #[test]
    fn status_and_upload_filters_apply() {
        let filter = GroupFilter {
            status: Some(GroupStatus::Pending),
            upload_task_id: Some(Uuid::nil()),
            ..GroupFilter::default()
        };
        let rendered = debug_query::<Pg, _>(&filtered(&filter).select(groups::id)).to_string();
        assert!(rendered.contains("\"groups\".\"status\" = $1"));
        assert!(rendered.contains("\"groups\".\"upload_task_id\" = $2"));
        assert!(rendered.contains("\"pending\""));
    }
}
