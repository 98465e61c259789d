//! Asynchronous task aggregate and its status state machine.
//!
//! ```text
//! pending ──start──▶ processing ──complete──▶ completed
//!                        │
//!                        └────────fail──────▶ failed
//! ```
//!
//! Transitions are monotonic. Re-entering `processing` from `processing` is
//! accepted as an idempotent re-pickup so redelivered queue jobs do not fail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Page;
use super::auth::Principal;
use super::job::QueueName;
use super::user::UserId;

/// Default priority for new tasks (1 = most urgent, 10 = least).
pub const DEFAULT_TASK_PRIORITY: u8 = 5;
/// Posts fetched per collection run when not specified.
pub const DEFAULT_POSTS_LIMIT: u32 = 20;
/// Upper bound for `posts_limit`.
pub const MAX_POSTS_LIMIT: u32 = 100;
/// Comments fetched per post when not specified.
pub const DEFAULT_COMMENTS_LIMIT: u32 = 1000;
/// Upper bound for `comments_limit` and `analyze_posts.limit`.
pub const MAX_BATCH_LIMIT: u32 = 10_000;
/// Comments analysed per `analyze_posts` run when not specified.
pub const DEFAULT_ANALYZE_LIMIT: u32 = 1000;

/// Kind of asynchronous work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Collect posts and comments of one community.
    FetchComments,
    /// Validate uploaded groups against VK.
    ProcessGroups,
    /// Run keyword matching over stored comments.
    AnalyzePosts,
}

impl TaskType {
    /// Every task type.
    pub const ALL: [Self; 3] = [Self::FetchComments, Self::ProcessGroups, Self::AnalyzePosts];

    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchComments => "fetch_comments",
            Self::ProcessGroups => "process_groups",
            Self::AnalyzePosts => "analyze_posts",
        }
    }

    /// Queue the task's job is routed to.
    pub fn queue(self) -> QueueName {
        match self {
            Self::FetchComments | Self::AnalyzePosts => QueueName::VkCollect,
            Self::ProcessGroups => QueueName::ProcessGroups,
        }
    }
}

impl FromStr for TaskType {
    type Err = TaskValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TaskValidationError::UnknownType(s.to_owned()))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not yet picked up.
    Pending,
    /// Picked up by a worker.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }

    /// States a task must be in to move to `self`.
    pub fn predecessors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending, Self::Processing],
            Self::Completed | Self::Failed => &[Self::Processing],
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures for task creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskValidationError {
    /// `task_type` is not one of the supported kinds.
    #[error("unknown task type: {0}")]
    UnknownType(String),
    /// Parameters were `null` or an empty object.
    #[error("task parameters must not be empty")]
    EmptyParameters,
    /// Parameters did not match the task type's schema.
    #[error("invalid task parameters: {0}")]
    InvalidParameters(String),
    /// Priority outside `1..=10`.
    #[error("priority must be between 1 and 10")]
    PriorityOutOfRange,
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task cannot move from {from} to {to}")]
pub struct TaskTransitionError {
    /// Current status.
    pub from: TaskStatus,
    /// Requested status.
    pub to: TaskStatus,
}

/// Scheduling priority in `1..=10`; lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(u8);

impl TaskPriority {
    /// Validate a priority value.
    pub fn new(value: u8) -> Result<Self, TaskValidationError> {
        if (1..=10).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TaskValidationError::PriorityOutOfRange)
        }
    }

    /// Raw value.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self(DEFAULT_TASK_PRIORITY)
    }
}

/// Parameters of a `fetch_comments` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchCommentsParams {
    /// VK community id (positive).
    pub group_id: i64,
    /// Restrict collection to one post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    /// Posts to page through.
    #[serde(default = "default_posts_limit")]
    pub posts_limit: u32,
    /// Comments to collect per post.
    #[serde(default = "default_comments_limit")]
    pub comments_limit: u32,
}

/// Parameters of a `process_groups` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessGroupsParams {
    /// Group rows to validate.
    pub group_ids: Vec<Uuid>,
}

/// Parameters of an `analyze_posts` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzePostsParams {
    /// Restrict analysis to these posts; empty means all unanalyzed comments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_ids: Vec<Uuid>,
    /// Maximum number of comments to analyse.
    #[serde(default = "default_analyze_limit")]
    pub limit: u32,
}

fn default_posts_limit() -> u32 {
    DEFAULT_POSTS_LIMIT
}

fn default_comments_limit() -> u32 {
    DEFAULT_COMMENTS_LIMIT
}

fn default_analyze_limit() -> u32 {
    DEFAULT_ANALYZE_LIMIT
}

/// Typed parameters, one variant per [`TaskType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskParameters {
    /// `fetch_comments`.
    FetchComments(FetchCommentsParams),
    /// `process_groups`.
    ProcessGroups(ProcessGroupsParams),
    /// `analyze_posts`.
    AnalyzePosts(AnalyzePostsParams),
}

impl TaskParameters {
    /// Validate raw JSON parameters for `task_type`.
    ///
    /// # Examples
    /// ```
    /// use serde_json::json;
    /// use vk_monitor::domain::{TaskParameters, TaskType, TaskValidationError};
    ///
    /// let empty = TaskParameters::parse(TaskType::FetchComments, &json!({}));
    /// assert_eq!(empty, Err(TaskValidationError::EmptyParameters));
    ///
    /// let ok = TaskParameters::parse(TaskType::FetchComments, &json!({ "group_id": 1 }));
    /// assert!(ok.is_ok());
    /// ```
    pub fn parse(task_type: TaskType, raw: &Value) -> Result<Self, TaskValidationError> {
        let is_empty = match raw {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(TaskValidationError::EmptyParameters);
        }

        let invalid = |err: serde_json::Error| TaskValidationError::InvalidParameters(err.to_string());
        let parsed = match task_type {
            TaskType::FetchComments => {
                Self::FetchComments(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::ProcessGroups => {
                Self::ProcessGroups(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::AnalyzePosts => {
                Self::AnalyzePosts(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), TaskValidationError> {
        let fail = |message: &str| Err(TaskValidationError::InvalidParameters(message.to_owned()));
        match self {
            Self::FetchComments(params) => {
                if params.group_id <= 0 {
                    return fail("group_id must be a positive VK community id");
                }
                if params.post_id.is_some_and(|id| id <= 0) {
                    return fail("post_id must be positive");
                }
                if !(1..=MAX_POSTS_LIMIT).contains(&params.posts_limit) {
                    return fail("posts_limit must be between 1 and 100");
                }
                if !(1..=MAX_BATCH_LIMIT).contains(&params.comments_limit) {
                    return fail("comments_limit must be between 1 and 10000");
                }
            }
            Self::ProcessGroups(params) => {
                if params.group_ids.is_empty() {
                    return fail("group_ids must not be empty");
                }
            }
            Self::AnalyzePosts(params) => {
                if !(1..=MAX_BATCH_LIMIT).contains(&params.limit) {
                    return fail("limit must be between 1 and 10000");
                }
            }
        }
        Ok(())
    }

    /// Task type the parameters belong to.
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::FetchComments(_) => TaskType::FetchComments,
            Self::ProcessGroups(_) => TaskType::ProcessGroups,
            Self::AnalyzePosts(_) => TaskType::AnalyzePosts,
        }
    }

    /// Canonical JSON form including defaults.
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            Self::FetchComments(params) => serde_json::to_value(params),
            Self::ProcessGroups(params) => serde_json::to_value(params),
            Self::AnalyzePosts(params) => serde_json::to_value(params),
        };
        encoded.unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Routing metadata copied into the queue job payload.
    pub fn job_metadata(&self) -> Value {
        match self {
            Self::FetchComments(params) => json!({
                "group_id": params.group_id,
                "post_id": params.post_id,
            }),
            Self::ProcessGroups(params) => json!({ "group_count": params.group_ids.len() }),
            Self::AnalyzePosts(params) => json!({ "post_ids": params.post_ids }),
        }
    }
}

/// Persisted task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Primary key.
    pub id: Uuid,
    /// Kind of work.
    pub task_type: TaskType,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Completion percentage (0-100).
    pub progress: u8,
    /// Canonical parameters.
    pub parameters: Value,
    /// Result payload once completed.
    pub result: Option<Value>,
    /// Last error message.
    pub error: Option<String>,
    /// Requesting user.
    pub created_by: Option<UserId>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Worker pickup time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion or failure time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task.
    pub fn new(
        parameters: &TaskParameters,
        priority: TaskPriority,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: parameters.task_type(),
            status: TaskStatus::Pending,
            priority,
            progress: 0,
            parameters: parameters.to_value(),
            result: None,
            error: None,
            created_by,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Re-validate stored parameters.
    pub fn typed_parameters(&self) -> Result<TaskParameters, TaskValidationError> {
        TaskParameters::parse(self.task_type, &self.parameters)
    }

    fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), TaskTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Mark the task as picked up by a worker.
    ///
    /// Returns `Ok(false)` when the task was already processing.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<bool, TaskTransitionError> {
        let first_pickup = self.status == TaskStatus::Pending;
        self.transition(TaskStatus::Processing, now)?;
        if first_pickup {
            self.started_at = Some(now);
        }
        Ok(first_pickup)
    }

    /// Store the result and finish successfully.
    pub fn complete(&mut self, result: Value, now: DateTime<Utc>) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Completed, now)?;
        self.result = Some(result);
        self.error = None;
        self.progress = 100;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Store the error and finish unsuccessfully.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Failed, now)?;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record an error that will be retried; status stays `processing`.
    pub fn note_retry(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.error = Some(error.into());
        self.updated_at = now;
    }

    /// Update progress, clamped to 0-100.
    pub fn set_progress(&mut self, percent: u8, now: DateTime<Utc>) {
        self.progress = percent.min(100);
        self.updated_at = now;
    }

    /// Whether `principal` may read this task.
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        principal.is_admin() || self.created_by == Some(principal.user_id)
    }

    /// Status view for polling clients.
    pub fn snapshot(&self) -> TaskStatusSnapshot {
        TaskStatusSnapshot {
            task_id: self.id,
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
            created_by: self.created_by,
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight status view mirrored to Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusSnapshot {
    /// Task identifier.
    pub task_id: Uuid,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Completion percentage.
    pub progress: u8,
    /// Last error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Requesting user, used for access checks on cache hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl TaskStatusSnapshot {
    /// Whether `principal` may read this task.
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        principal.is_admin() || self.created_by == Some(principal.user_id)
    }
}

/// Filters accepted by task listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Only this status.
    pub status: Option<TaskStatus>,
    /// Only this type.
    pub task_type: Option<TaskType>,
    /// Only tasks requested by this user.
    pub created_by: Option<UserId>,
    /// Page bounds.
    pub page: Page,
}
