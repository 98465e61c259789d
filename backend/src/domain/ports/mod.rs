//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports (repositories, stores, the queue producer, the VK source)
//! describe what the domain needs from infrastructure. Driving ports
//! (`*Command`, `*Query`, `AuthService`, `JobHandler`) are what inbound
//! adapters call. Each driven port exposes its own error enum built with
//! [`define_port_error!`] so services map failures predictably.

mod macros;
pub(crate) use macros::define_port_error;

mod auth_service;
mod comment_command;
mod comment_repository;
mod dashboard_query;
mod group_command;
mod group_repository;
mod job_queue;
mod keyword_command;
mod keyword_repository;
mod password_hasher;
mod post_query;
mod post_repository;
mod refresh_token_store;
mod task_command;
mod task_repository;
mod task_status_store;
mod token_issuer;
mod user_repository;
mod vk_source;

pub use auth_service::AuthService;
#[cfg(test)]
pub use auth_service::MockAuthService;
pub use comment_command::{CommentCommand, CommentQuery};
#[cfg(test)]
pub use comment_command::{MockCommentCommand, MockCommentQuery};
pub use comment_repository::{CommentRepository, CommentRepositoryError};
#[cfg(test)]
pub use comment_repository::MockCommentRepository;
pub use dashboard_query::DashboardQuery;
#[cfg(test)]
pub use dashboard_query::MockDashboardQuery;
pub use group_command::{GroupCommand, GroupQuery, GroupUploadOutcome};
#[cfg(test)]
pub use group_command::{MockGroupCommand, MockGroupQuery};
pub use group_repository::{GroupRepository, GroupRepositoryError};
#[cfg(test)]
pub use group_repository::MockGroupRepository;
pub use job_queue::{JobHandler, JobQueue, JobQueueError, JobSource};
#[cfg(test)]
pub use job_queue::{MockJobHandler, MockJobQueue, MockJobSource};
pub use keyword_command::{BulkKeywordOutcome, KeywordCommand, KeywordQuery};
#[cfg(test)]
pub use keyword_command::{MockKeywordCommand, MockKeywordQuery};
pub use keyword_repository::{KeywordRepository, KeywordRepositoryError};
#[cfg(test)]
pub use keyword_repository::MockKeywordRepository;
#[cfg(test)]
pub use password_hasher::MockPasswordHasher;
pub use password_hasher::{PasswordHashError, PasswordHasher};
#[cfg(test)]
pub use post_query::MockPostQuery;
pub use post_query::PostQuery;
#[cfg(test)]
pub use post_repository::MockPostRepository;
pub use post_repository::{PostRepository, PostRepositoryError};
#[cfg(test)]
pub use refresh_token_store::MockRefreshTokenStore;
pub use refresh_token_store::{RefreshTokenStore, RefreshTokenStoreError};
pub use task_command::{EnqueueTaskRequest, TaskCommand, TaskQuery};
#[cfg(test)]
pub use task_command::{MockTaskCommand, MockTaskQuery};
#[cfg(test)]
pub use task_repository::MockTaskRepository;
pub use task_repository::{TaskRepository, TaskRepositoryError};
#[cfg(test)]
pub use task_status_store::MockTaskStatusStore;
pub use task_status_store::{NoOpTaskStatusStore, TaskStatusStore, TaskStatusStoreError};
#[cfg(test)]
pub use token_issuer::MockTokenIssuer;
pub use token_issuer::{IssuedToken, TokenError, TokenIssuer};
#[cfg(test)]
pub use user_repository::MockUserRepository;
pub use user_repository::{UserPersistenceError, UserRepository};
#[cfg(test)]
pub use vk_source::MockVkSource;
pub use vk_source::{
    RETRYABLE_VK_ERROR_CODES, VkComment, VkGroup, VkPage, VkPost, VkSource, VkSourceError,
};
