//! Domain primitives, aggregates and use-case services.
//!
//! Purpose: define strongly typed entities for comments, keywords, groups,
//! posts, tasks and users, and the services that orchestrate them through
//! the ports in [`ports`]. Nothing here depends on actix, Diesel or Redis.
//!
//! Public surface:
//! - Error (alias to `error::Error`) and ErrorCode: transport-agnostic
//!   failure payload.
//! - TraceId: request correlation identifier held in task-local storage.
//! - Task, TaskType, TaskStatus: asynchronous work and its state machine.
//! - KeywordMatcher: configured keyword matching used by the worker.

pub mod auth;
pub mod comment;
pub mod dashboard;
pub mod error;
pub mod group;
pub mod job;
pub mod keyword;
pub mod keyword_matcher;
pub mod page;
pub mod ports;
pub mod post;
pub mod task;
pub mod trace_id;
pub mod user;

mod auth_service;
mod comment_service;
mod dashboard_service;
mod group_service;
mod keyword_service;
mod post_service;
mod task_service;
pub mod task_processor;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use self::auth::{
    LoginCredentials, LoginValidationError, NewPassword, PASSWORD_MAX, PASSWORD_MIN,
    PasswordPolicyError, Principal, Registration, RegistrationValidationError, TokenKind,
    TokenPair,
};
pub use self::auth_service::{AuthenticationService, refresh_fingerprint};
pub use self::comment::{
    COMMENT_TEXT_MAX, COMMENT_TEXT_MIN, Comment, CommentAuthor, CommentFilter, CommentText,
    CommentMatches, CommentTextError, IngestedComment, VkCommentRef,
};
pub use self::comment_service::CommentService;
pub use self::dashboard::{
    CommentStats, DashboardStats, KeywordStats, TOP_KEYWORDS, TopKeyword, status_counts,
};
pub use self::dashboard_service::DashboardService;
pub use self::error::{Error, ErrorCode};
pub use self::group::{
    ALREADY_MONITORED_REASON, Group, GroupFilter, GroupReference, GroupReferenceError, GroupResolution, GroupStatus,
    split_group_upload,
};
pub use self::group_service::GroupService;
pub use self::job::{
    DEFAULT_BACKOFF_MS, DEFAULT_JOB_ATTEMPTS, JobEnvelope, JobError, JobOptions, MAX_BACKOFF_MS,
    QueueName, QueueStats, TaskJobPayload,
};
pub use self::keyword::{
    DEFAULT_KEYWORD_CATEGORY, KEYWORD_CATEGORY_MAX, KEYWORD_WORD_MAX, Keyword, KeywordCategory,
    KeywordDraft, KeywordFilter, KeywordPatch, KeywordValidationError,
    KeywordWord, MatchOptions,
};
pub use self::keyword_matcher::{
    DEFAULT_ANALYSIS_KEYWORDS, KeywordAnalysis, KeywordHit, KeywordHitTally, KeywordMatcher,
    analyze_default_keywords,
};
pub use self::keyword_service::KeywordService;
pub use self::page::{DEFAULT_PAGE_LIMIT, Listing, MAX_PAGE_LIMIT, Page, PageError};
pub use self::post::{Post, PostFilter, PostUpsert};
pub use self::post_service::PostService;
pub use self::task::{
    AnalyzePostsParams, FetchCommentsParams, ProcessGroupsParams, Task, TaskFilter,
    TaskParameters, TaskPriority, TaskStatus, TaskStatusSnapshot, TaskTransitionError, TaskType,
    TaskValidationError,
};
pub use self::task_processor::{
    AttemptJitter, BackoffJitter, RetrySleeper, TaskProcessor, TaskProcessorConfig,
    TaskProcessorPorts, TaskProcessorRuntime, TokioSleeper,
};
pub use self::task_service::TaskService;
pub use self::trace_id::TraceId;
pub use self::user::{
    EmailAddress, Role, User, UserAccount, UserId, UserValidationError, Username,
};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use vk_monitor::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
