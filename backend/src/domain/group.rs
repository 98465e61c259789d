//! VK community (group) records uploaded for monitoring.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Page;
use super::user::UserId;

const SCREEN_NAME_MAX: usize = 64;
const ID_PREFIXES: [&str; 3] = ["club", "public", "event"];
const HOST_PREFIXES: [&str; 4] = ["vk.com/", "vk.ru/", "m.vk.com/", "m.vk.ru/"];

/// Validation lifecycle of an uploaded group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Awaiting validation by the worker.
    Pending,
    /// Resolved to an accessible community.
    Valid,
    /// Malformed, unknown, or deactivated.
    Invalid,
    /// Same community as an already valid group.
    Duplicate,
}

impl GroupStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Valid, Self::Invalid, Self::Duplicate];

    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Duplicate => "duplicate",
        }
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "duplicate" => Ok(Self::Duplicate),
            other => Err(format!("unknown group status: {other}")),
        }
    }
}

/// Parse failure for a community reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupReferenceError {
    /// Nothing left after stripping URL decoration.
    #[error("group reference is empty")]
    Empty,
    /// Not a numeric id nor a valid screen name.
    #[error("`{0}` is not a VK community link, id, or screen name")]
    Malformed(String),
}

/// Normalised pointer to a VK community.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupReference {
    /// Numeric community id (always positive).
    Id(i64),
    /// Lower-cased screen name.
    ScreenName(String),
}

impl GroupReference {
    /// Parse any supported reference form.
    ///
    /// # Examples
    /// ```
    /// use vk_monitor::domain::GroupReference;
    ///
    /// let by_link = GroupReference::parse("https://vk.com/club123").unwrap();
    /// assert_eq!(by_link, GroupReference::Id(123));
    /// let by_name = GroupReference::parse("@Durov_Team").unwrap();
    /// assert_eq!(by_name, GroupReference::ScreenName("durov_team".into()));
    /// ```
    pub fn parse(raw: &str) -> Result<Self, GroupReferenceError> {
        let mut rest = raw.trim();
        for scheme in ["https://", "http://"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
            }
        }
        if let Some(stripped) = rest.strip_prefix("www.") {
            rest = stripped;
        }
        for host in HOST_PREFIXES {
            if let Some(stripped) = rest.strip_prefix(host) {
                rest = stripped;
                break;
            }
        }
        let rest = rest
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .trim_start_matches('@');
        if rest.is_empty() {
            return Err(GroupReferenceError::Empty);
        }

        let numeric = rest.strip_prefix('-').unwrap_or(rest);
        if let Ok(id) = numeric.parse::<i64>() {
            return positive_id(id, raw);
        }
        let lowered = rest.to_lowercase();
        for prefix in ID_PREFIXES {
            if let Some(digits) = lowered.strip_prefix(prefix) {
                if let Ok(id) = digits.parse::<i64>() {
                    return positive_id(id, raw);
                }
            }
        }

        let valid_name = lowered.chars().count() <= SCREEN_NAME_MAX
            && lowered
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if valid_name {
            Ok(Self::ScreenName(lowered))
        } else {
            Err(GroupReferenceError::Malformed(raw.trim().to_owned()))
        }
    }

    /// Value accepted by `groups.getById`.
    pub fn lookup_key(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::ScreenName(name) => name.clone(),
        }
    }
}

fn positive_id(id: i64, raw: &str) -> Result<GroupReference, GroupReferenceError> {
    if id > 0 {
        Ok(GroupReference::Id(id))
    } else {
        Err(GroupReferenceError::Malformed(raw.trim().to_owned()))
    }
}

impl fmt::Display for GroupReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "club{id}"),
            Self::ScreenName(name) => f.write_str(name),
        }
    }
}

/// Split an upload body into raw references.
///
/// Accepts newline, comma, semicolon, or whitespace separators.
pub fn split_group_upload(body: &str) -> Vec<&str> {
    body.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Stored community record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Primary key.
    pub id: Uuid,
    /// Resolved VK id once validated (or parsed from a numeric reference).
    pub vk_group_id: Option<i64>,
    /// Normalised reference as uploaded.
    pub screen_name: String,
    /// Community name once validated.
    pub name: Option<String>,
    /// Validation status.
    pub status: GroupStatus,
    /// Why the group is not valid, when known.
    pub status_reason: Option<String>,
    /// Task that validates this upload.
    pub upload_task_id: Option<Uuid>,
    /// Uploading user.
    pub created_by: Option<UserId>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Whether `user` uploaded this group.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.created_by.as_ref() == Some(user)
    }
}

/// Outcome of validating one group against VK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResolution {
    /// Group row to update.
    pub group_id: Uuid,
    /// New status.
    pub status: GroupStatus,
    /// Resolved VK id.
    pub vk_group_id: Option<i64>,
    /// Resolved name.
    pub name: Option<String>,
    /// Explanation for non-valid outcomes.
    pub status_reason: Option<String>,
}

/// Reason stored on groups whose community another row already monitors.
pub const ALREADY_MONITORED_REASON: &str = "community is already monitored";

impl GroupResolution {
    /// Whether this outcome would make the group the valid row for its community.
    pub fn claims_community(&self) -> Option<i64> {
        match self.status {
            GroupStatus::Valid => self.vk_group_id,
            _ => None,
        }
    }

    /// Downgrade a valid outcome because another row holds the community.
    pub fn into_duplicate(self) -> Self {
        Self {
            status: GroupStatus::Duplicate,
            status_reason: Some(ALREADY_MONITORED_REASON.to_owned()),
            ..self
        }
    }
}

/// Filters accepted by group listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    /// Only this status.
    pub status: Option<GroupStatus>,
    /// Only groups from this upload.
    pub upload_task_id: Option<Uuid>,
    /// Page bounds.
    pub page: Page,
}
