//! `process_groups`: validate uploaded communities against `groups.getById`.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use crate::domain::ports::VkGroup;
use crate::domain::{
    ALREADY_MONITORED_REASON, Group, GroupResolution, GroupStatus, ProcessGroupsParams,
};

use super::{ExecutionError, ProgressReporter, TaskProcessor};

/// Largest batch `groups.getById` accepts.
pub(super) const GROUPS_BATCH_SIZE: usize = 500;

#[derive(Debug, Default)]
struct ValidationTally {
    valid: usize,
    invalid: usize,
    duplicate: usize,
}

impl ValidationTally {
    fn record(&mut self, status: GroupStatus) {
        match status {
            GroupStatus::Valid => self.valid += 1,
            GroupStatus::Invalid => self.invalid += 1,
            GroupStatus::Duplicate => self.duplicate += 1,
            GroupStatus::Pending => {}
        }
    }
}

/// Key used to look up a stored group in a `groups.getById` answer.
fn lookup_key(group: &Group) -> String {
    group
        .vk_group_id
        .map_or_else(|| group.screen_name.to_lowercase(), |id| id.to_string())
}

/// Index a VK answer by numeric id and by lower-cased screen name.
fn index_resolved(resolved: &[VkGroup]) -> HashMap<String, &VkGroup> {
    let mut index = HashMap::with_capacity(resolved.len() * 2);
    for group in resolved {
        index.insert(group.id.to_string(), group);
        index.insert(group.screen_name.to_lowercase(), group);
    }
    index
}

/// Decide the outcome for one stored group.
///
/// `claimed` holds VK ids already owned by a valid group; a valid outcome
/// claims its id.
fn resolve(
    group: &Group,
    found: Option<&VkGroup>,
    claimed: &mut HashSet<i64>,
) -> GroupResolution {
    let (status, vk_group_id, name, status_reason) = match found {
        None => (
            GroupStatus::Invalid,
            group.vk_group_id,
            None,
            Some("community not found".to_owned()),
        ),
        Some(vk) => match &vk.deactivated {
            Some(state) => (
                GroupStatus::Invalid,
                Some(vk.id),
                Some(vk.name.clone()),
                Some(format!("community is {state}")),
            ),
            None if !claimed.insert(vk.id) => (
                GroupStatus::Duplicate,
                Some(vk.id),
                Some(vk.name.clone()),
                Some(ALREADY_MONITORED_REASON.to_owned()),
            ),
            None => (GroupStatus::Valid, Some(vk.id), Some(vk.name.clone()), None),
        },
    };
    GroupResolution {
        group_id: group.id,
        status,
        vk_group_id,
        name,
        status_reason,
    }
}

impl TaskProcessor {
    pub(super) async fn process_groups(
        &self,
        params: &ProcessGroupsParams,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Value, ExecutionError> {
        let pending: Vec<Group> = self
            .groups
            .find_by_ids(&params.group_ids)
            .await?
            .into_iter()
            .filter(|group| group.status == GroupStatus::Pending)
            .collect();

        let mut tally = ValidationTally::default();
        let batches: Vec<&[Group]> = pending.chunks(GROUPS_BATCH_SIZE).collect();
        let total = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            let keys: Vec<String> = batch.iter().map(lookup_key).collect();
            let resolved = self
                .vk_call("groups.getById", || self.vk.groups_by_ids(&keys))
                .await?;

            let resolved_ids: Vec<i64> = resolved.iter().map(|group| group.id).collect();
            let mut claimed: HashSet<i64> = self
                .groups
                .find_valid_matching(&[], &resolved_ids)
                .await?
                .into_iter()
                .filter_map(|group| group.vk_group_id)
                .collect();

            let index_by_key = index_resolved(&resolved);
            let resolutions: Vec<GroupResolution> = batch
                .iter()
                .map(|group| {
                    let found = index_by_key.get(&lookup_key(group)).copied();
                    resolve(group, found, &mut claimed)
                })
                .collect();
            // The repository has the final say; a concurrent job may have
            // claimed a community since the lookup above.
            let stored = self
                .groups
                .apply_resolutions(&resolutions, self.clock.utc())
                .await?;
            for resolution in &stored {
                tally.record(resolution.status);
            }
            progress.report(index + 1, total).await;
        }

        Ok(json!({
            "groups_total": pending.len(),
            "valid": tally.valid,
            "invalid": tally.invalid,
            "duplicate": tally.duplicate,
        }))
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::test_fixtures::fixture_timestamp;
    use uuid::Uuid;

    fn stored(screen_name: &str, vk_group_id: Option<i64>) -> Group {
        Group {
            id: Uuid::new_v4(),
            vk_group_id,
            screen_name: screen_name.to_owned(),
            name: None,
            status: GroupStatus::Pending,
            status_reason: None,
            upload_task_id: None,
            created_by: None,
            created_at: fixture_timestamp(),
            updated_at: fixture_timestamp(),
        }
    }

    fn vk(id: i64, screen_name: &str, deactivated: Option<&str>) -> VkGroup {
        VkGroup {
            id,
            screen_name: screen_name.to_owned(),
            name: format!("Group {id}"),
            deactivated: deactivated.map(str::to_owned),
        }
    }

    #[test]
    fn lookup_key_prefers_numeric_id() {
        assert_eq!(lookup_key(&stored("club5", Some(5))), "5");
        assert_eq!(lookup_key(&stored("News", None)), "news");
    }

    #[test]
    fn resolve_marks_missing_and_deactivated_as_invalid() {
        let mut claimed = HashSet::new();
        let missing = resolve(&stored("gone", None), None, &mut claimed);
        assert_eq!(missing.status, GroupStatus::Invalid);

        let banned = vk(3, "banned", Some("banned"));
        let outcome = resolve(&stored("banned", None), Some(&banned), &mut claimed);
        assert_eq!(outcome.status, GroupStatus::Invalid);
        assert_eq!(outcome.status_reason.as_deref(), Some("community is banned"));
        assert!(claimed.is_empty());
    }

    #[test]
    fn second_reference_to_same_community_is_duplicate() {
        let mut claimed = HashSet::new();
        let community = vk(9, "team", None);
        let first = resolve(&stored("team", None), Some(&community), &mut claimed);
        let second = resolve(&stored("club9", Some(9)), Some(&community), &mut claimed);
        assert_eq!(first.status, GroupStatus::Valid);
        assert_eq!(first.vk_group_id, Some(9));
        assert_eq!(second.status, GroupStatus::Duplicate);
    }

    #[test]
    fn index_matches_names_case_insensitively() {
        let resolved = [vk(4, "Durov", None)];
        let index = index_resolved(&resolved);
        assert!(index.contains_key("durov"));
        assert!(index.contains_key("4"));
    }
}
