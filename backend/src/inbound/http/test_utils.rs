//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_web::web;

use crate::domain::ports::{
    MockAuthService, MockCommentCommand, MockCommentQuery, MockDashboardQuery, MockGroupCommand,
    MockGroupQuery, MockKeywordCommand, MockKeywordQuery, MockPostQuery, MockTaskCommand,
    MockTaskQuery,
};
use crate::domain::{Principal, Role, UserId};

use super::state::HttpState;

/// Mocked driving ports; set expectations on the fields, then convert.
///
/// Ports without expectations panic when called, so each test states
/// exactly which use-cases a request may reach.
#[derive(Default)]
pub struct TestPorts {
    pub auth: MockAuthService,
    pub comments: MockCommentCommand,
    pub comments_query: MockCommentQuery,
    pub keywords: MockKeywordCommand,
    pub keywords_query: MockKeywordQuery,
    pub groups: MockGroupCommand,
    pub groups_query: MockGroupQuery,
    pub posts: MockPostQuery,
    pub tasks: MockTaskCommand,
    pub tasks_query: MockTaskQuery,
    pub dashboard: MockDashboardQuery,
}

/// Header value accepted by [`TestPorts::authenticated`].
pub const TEST_BEARER: &str = "Bearer test-token";

impl TestPorts {
    /// Ports whose auth service accepts any bearer token as `principal`.
    pub fn authenticated(principal: Principal) -> Self {
        let mut ports = Self::default();
        ports
            .auth
            .expect_authenticate()
            .returning(move |_| Ok(principal));
        ports
    }

    /// Wrap the mocks in shared handler state.
    pub fn into_data(self) -> web::Data<HttpState> {
        web::Data::new(HttpState {
            auth: Arc::new(self.auth),
            comments: Arc::new(self.comments),
            comments_query: Arc::new(self.comments_query),
            keywords: Arc::new(self.keywords),
            keywords_query: Arc::new(self.keywords_query),
            groups: Arc::new(self.groups),
            groups_query: Arc::new(self.groups_query),
            posts: Arc::new(self.posts),
            tasks: Arc::new(self.tasks),
            tasks_query: Arc::new(self.tasks_query),
            dashboard: Arc::new(self.dashboard),
        })
    }
}

/// Regular user principal with a fresh id.
pub fn user_principal() -> Principal {
    Principal {
        user_id: UserId::random(),
        role: Role::User,
    }
}

/// Admin principal with a fresh id.
pub fn admin_principal() -> Principal {
    Principal {
        user_id: UserId::random(),
        role: Role::Admin,
    }
}
