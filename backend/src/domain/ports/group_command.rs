//! Driving ports for group uploads.
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Error, Group, GroupFilter, Listing, Principal, Task};

/// Result of one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupUploadOutcome {
    /// Validation task, absent when nothing needs validating.
    pub task: Option<Task>,
    /// Rows stored by this upload.
    pub groups: Vec<Group>,
    /// Entries queued for validation.
    pub pending: usize,
    /// Entries matching an already valid group.
    pub duplicates: usize,
    /// Entries that could not be parsed.
    pub invalid: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupCommand: Send + Sync {
    /// Store the references in `body` and enqueue their validation.
    async fn upload(&self, principal: &Principal, body: String)
    -> Result<GroupUploadOutcome, Error>;

    /// Delete a group uploaded by `principal` (admins may delete any).
    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupQuery: Send + Sync {
    /// Newest-first listing.
    async fn list(&self, filter: GroupFilter) -> Result<Listing<Group>, Error>;
}
