//! Port for uploaded group persistence.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Group, GroupFilter, GroupResolution, GroupStatus, Listing};

use super::define_port_error;

define_port_error! {
    /// Errors raised by group repository adapters.
    pub enum GroupRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "group repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "group repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Insert uploaded groups.
    async fn insert_many(&self, groups: &[Group]) -> Result<(), GroupRepositoryError>;

    /// Fetch a group by id.
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Group>, GroupRepositoryError>;

    /// Fetch the listed groups, skipping unknown ids.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Group>, GroupRepositoryError>;

    /// Valid groups whose screen name or VK id matches any of the inputs.
    async fn find_valid_matching(
        &self,
        screen_names: &[String],
        vk_group_ids: &[i64],
    ) -> Result<Vec<Group>, GroupRepositoryError>;

    /// Store validation outcomes and return them as written.
    ///
    /// At most one row per VK community is ever valid: a valid outcome for a
    /// community another row already holds is stored as duplicate. The check
    /// and the writes are atomic with respect to concurrent callers.
    async fn apply_resolutions(
        &self,
        resolutions: &[GroupResolution],
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<GroupResolution>, GroupRepositoryError>;

    /// Delete a group. Returns `false` when nothing was deleted.
    async fn delete(&self, id: &Uuid) -> Result<bool, GroupRepositoryError>;

    /// Newest-first listing.
    async fn list(&self, filter: &GroupFilter) -> Result<Listing<Group>, GroupRepositoryError>;

    /// Row counts per status.
    async fn count_by_status(&self) -> Result<Vec<(GroupStatus, i64)>, GroupRepositoryError>;
}
