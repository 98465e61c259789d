//! Group upload and management use-cases.
//!
//! Uploads are parsed and classified synchronously; anything that needs VK
//! to decide is stored as pending and handed to a `process_groups` task.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{
    GroupCommand, GroupQuery, GroupRepository, GroupRepositoryError, GroupUploadOutcome,
    TaskCommand,
};
use crate::domain::{
    ALREADY_MONITORED_REASON, Error, Group, GroupFilter, GroupReference, GroupStatus, Listing, Principal,
    ProcessGroupsParams, TaskParameters, TaskPriority, split_group_upload,
};

/// Longest raw reference stored for an invalid entry.
const RAW_REFERENCE_MAX: usize = 255;

fn map_repository_error(error: GroupRepositoryError) -> Error {
    match error {
        GroupRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("group repository unavailable: {message}"))
        }
        GroupRepositoryError::Query { message } => {
            Error::internal(format!("group repository error: {message}"))
        }
    }
}

/// Upload entries after parsing, in input order.
#[derive(Debug, Default)]
struct ParsedUpload {
    references: Vec<GroupReference>,
    invalid: Vec<(String, String)>,
}

fn parse_upload(body: &str) -> ParsedUpload {
    let mut parsed = ParsedUpload::default();
    let mut seen = HashSet::new();
    let mut seen_invalid = HashSet::new();
    for raw in split_group_upload(body) {
        match GroupReference::parse(raw) {
            Ok(reference) => {
                if seen.insert(reference.clone()) {
                    parsed.references.push(reference);
                }
            }
            Err(error) => {
                let stored: String = raw.chars().take(RAW_REFERENCE_MAX).collect();
                if seen_invalid.insert(stored.to_lowercase()) {
                    parsed.invalid.push((stored, error.to_string()));
                }
            }
        }
    }
    parsed
}

fn matching_valid<'a>(reference: &GroupReference, valid: &'a [Group]) -> Option<&'a Group> {
    valid.iter().find(|group| match reference {
        GroupReference::Id(id) => group.vk_group_id == Some(*id),
        GroupReference::ScreenName(name) => group.screen_name.eq_ignore_ascii_case(name),
    })
}

/// Group service implementing the command and query driving ports.
#[derive(Clone)]
pub struct GroupService<G, T> {
    groups: Arc<G>,
    tasks: Arc<T>,
    clock: Arc<dyn Clock>,
}

impl<G, T> GroupService<G, T> {
    /// Create a service over the group repository and task command port.
    pub fn new(groups: Arc<G>, tasks: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        Self {
            groups,
            tasks,
            clock,
        }
    }
}

impl<G, T> GroupService<G, T>
where
    G: GroupRepository,
    T: TaskCommand,
{
    fn row(
        &self,
        principal: &Principal,
        screen_name: String,
        status: GroupStatus,
        vk_group_id: Option<i64>,
    ) -> Group {
        let now = self.clock.utc();
        Group {
            id: Uuid::new_v4(),
            vk_group_id,
            screen_name,
            name: None,
            status,
            status_reason: None,
            upload_task_id: None,
            created_by: Some(principal.user_id),
            created_at: now,
            updated_at: now,
        }
    }

    async fn existing_valid(&self, references: &[GroupReference]) -> Result<Vec<Group>, Error> {
        let mut screen_names = Vec::new();
        let mut vk_ids = Vec::new();
        for reference in references {
            match reference {
                GroupReference::Id(id) => vk_ids.push(*id),
                GroupReference::ScreenName(name) => screen_names.push(name.clone()),
            }
        }
        self.groups
            .find_valid_matching(&screen_names, &vk_ids)
            .await
            .map_err(map_repository_error)
    }
}

#[async_trait]
impl<G, T> GroupCommand for GroupService<G, T>
where
    G: GroupRepository,
    T: TaskCommand,
{
    async fn upload(
        &self,
        principal: &Principal,
        body: String,
    ) -> Result<GroupUploadOutcome, Error> {
        let parsed = parse_upload(&body);
        if parsed.references.is_empty() && parsed.invalid.is_empty() {
            return Err(Error::invalid_request("no group references supplied"));
        }
        let valid = self.existing_valid(&parsed.references).await?;

        let mut rows = Vec::new();
        let mut pending = Vec::new();
        let mut duplicates = 0;
        for reference in &parsed.references {
            let parsed_id = match reference {
                GroupReference::Id(id) => Some(*id),
                GroupReference::ScreenName(_) => None,
            };
            match matching_valid(reference, &valid) {
                Some(existing) => {
                    let mut row = self.row(
                        principal,
                        reference.to_string(),
                        GroupStatus::Duplicate,
                        existing.vk_group_id,
                    );
                    row.name.clone_from(&existing.name);
                    row.status_reason = Some(ALREADY_MONITORED_REASON.to_owned());
                    rows.push(row);
                    duplicates += 1;
                }
                None => pending.push(self.row(
                    principal,
                    reference.to_string(),
                    GroupStatus::Pending,
                    parsed_id,
                )),
            }
        }
        let invalid = parsed.invalid.len();
        for (raw, reason) in parsed.invalid {
            let mut row = self.row(principal, raw, GroupStatus::Invalid, None);
            row.status_reason = Some(reason);
            rows.push(row);
        }

        let task = if pending.is_empty() {
            None
        } else {
            let parameters = TaskParameters::ProcessGroups(ProcessGroupsParams {
                group_ids: pending.iter().map(|group| group.id).collect(),
            });
            let task = self
                .tasks
                .create_task(parameters, TaskPriority::default(), Some(principal.user_id))
                .await?;
            for group in &mut pending {
                group.upload_task_id = Some(task.id);
            }
            Some(task)
        };

        let pending_count = pending.len();
        rows.extend(pending);
        self.groups
            .insert_many(&rows)
            .await
            .map_err(map_repository_error)?;
        if let Some(task) = &task {
            self.tasks.dispatch_task(task).await?;
        }

        info!(
            user_id = %principal.user_id,
            pending = pending_count,
            duplicates,
            invalid,
            task_id = ?task.as_ref().map(|task| task.id),
            "groups uploaded"
        );
        Ok(GroupUploadOutcome {
            task,
            groups: rows,
            pending: pending_count,
            duplicates,
            invalid,
        })
    }

    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error> {
        let group = self
            .groups
            .find_by_id(&id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| Error::not_found(format!("group {id} not found")))?;
        if !principal.is_admin() && !group.is_owned_by(&principal.user_id) {
            return Err(Error::forbidden("only the uploader or an admin may delete this group"));
        }
        let deleted = self
            .groups
            .delete(&id)
            .await
            .map_err(map_repository_error)?;
        if !deleted {
            return Err(Error::not_found(format!("group {id} not found")));
        }
        info!(group_id = %id, "group deleted");
        Ok(())
    }
}

#[async_trait]
impl<G, T> GroupQuery for GroupService<G, T>
where
    G: GroupRepository,
    T: TaskCommand,
{
    async fn list(&self, filter: GroupFilter) -> Result<Listing<Group>, Error> {
        self.groups
            .list(&filter)
            .await
            .map_err(map_repository_error)
    }
}
