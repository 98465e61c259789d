//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Repositories are thin translators between Diesel rows and domain records;
//! all rules live in the domain services. Row structs (`models.rs`) and the
//! table definitions (`schema.rs`) stay private to this module. Every
//! database failure is mapped onto the owning port's error enum.
//!
//! # Example
//!
//! ```ignore
//! use vk_monitor::outbound::persistence::{DbPool, DieselCommentRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/vkmon")).await?;
//! let comments = DieselCommentRepository::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_comment_repository;
mod diesel_group_repository;
pub(crate) mod diesel_helpers;
mod diesel_keyword_repository;
mod diesel_post_repository;
mod diesel_task_repository;
mod diesel_user_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_comment_repository::DieselCommentRepository;
pub use diesel_group_repository::DieselGroupRepository;
pub use diesel_keyword_repository::DieselKeywordRepository;
pub use diesel_post_repository::DieselPostRepository;
pub use diesel_task_repository::DieselTaskRepository;
pub use diesel_user_repository::DieselUserRepository;
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
