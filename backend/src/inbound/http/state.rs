//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain ports (use-cases) and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{
    AuthService, CommentCommand, CommentQuery, DashboardQuery, GroupCommand, GroupQuery,
    KeywordCommand, KeywordQuery, PostQuery, TaskCommand, TaskQuery,
};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub auth: Arc<dyn AuthService>,
    pub comments: Arc<dyn CommentCommand>,
    pub comments_query: Arc<dyn CommentQuery>,
    pub keywords: Arc<dyn KeywordCommand>,
    pub keywords_query: Arc<dyn KeywordQuery>,
    pub groups: Arc<dyn GroupCommand>,
    pub groups_query: Arc<dyn GroupQuery>,
    pub posts: Arc<dyn PostQuery>,
    pub tasks: Arc<dyn TaskCommand>,
    pub tasks_query: Arc<dyn TaskQuery>,
    pub dashboard: Arc<dyn DashboardQuery>,
}
