//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every HTTP endpoint from the inbound layer, the
//! response DTOs they return and the bearer JWT security scheme. The
//! generated document backs Swagger UI (debug builds) and is exported by
//! `cargo run --bin openapi-dump` for external tooling.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{
    DashboardStats, Error, ErrorCode, KeywordAnalysis, TaskStatusSnapshot, TokenPair, User,
};
use crate::inbound::http::comments::CommentResponse;
use crate::inbound::http::groups::{GroupResponse, GroupUploadResponse};
use crate::inbound::http::keywords::{BulkKeywordResponse, KeywordResponse};
use crate::inbound::http::posts::PostResponse;
use crate::inbound::http::tasks::TaskResponse;

/// Name of the security scheme referenced by protected operations.
pub const BEARER_SCHEME: &str = "BearerAuth";

/// Enrich the generated document with the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            BEARER_SCHEME,
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "Access token issued by POST /api/v1/auth/login or /auth/refresh.",
                    ))
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the REST API.
/// Swagger UI is enabled in debug builds only and used by tooling.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "VK monitor API",
        description = "Collects VK community comments, matches them against keywords and \
                       exposes the results over HTTP."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("BearerAuth" = [])),
    paths(
        crate::inbound::http::users::register,
        crate::inbound::http::users::login,
        crate::inbound::http::users::refresh,
        crate::inbound::http::users::logout,
        crate::inbound::http::users::current_user,
        crate::inbound::http::users::change_password,
        crate::inbound::http::comments::list_comments,
        crate::inbound::http::comments::create_comment,
        crate::inbound::http::comments::get_comment,
        crate::inbound::http::comments::update_comment,
        crate::inbound::http::comments::delete_comment,
        crate::inbound::http::comments::analyze_comment,
        crate::inbound::http::keywords::list_keywords,
        crate::inbound::http::keywords::create_keyword,
        crate::inbound::http::keywords::bulk_create_keywords,
        crate::inbound::http::keywords::get_keyword,
        crate::inbound::http::keywords::update_keyword,
        crate::inbound::http::keywords::delete_keyword,
        crate::inbound::http::groups::list_groups,
        crate::inbound::http::groups::upload_groups,
        crate::inbound::http::groups::delete_group,
        crate::inbound::http::posts::list_posts,
        crate::inbound::http::tasks::enqueue_task,
        crate::inbound::http::tasks::list_tasks,
        crate::inbound::http::tasks::get_task,
        crate::inbound::http::tasks::get_task_status,
        crate::inbound::http::dashboard::dashboard,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        User,
        TokenPair,
        CommentResponse,
        KeywordAnalysis,
        KeywordResponse,
        BulkKeywordResponse,
        GroupResponse,
        GroupUploadResponse,
        PostResponse,
        TaskResponse,
        TaskStatusSnapshot,
        DashboardStats,
    )),
    tags(
        (name = "auth", description = "Registration, tokens and the current user"),
        (name = "comments", description = "Comment CRUD and keyword analysis"),
        (name = "keywords", description = "Monitored keywords"),
        (name = "groups", description = "VK communities under monitoring"),
        (name = "posts", description = "Collected wall posts"),
        (name = "tasks", description = "Background collection and validation tasks"),
        (name = "dashboard", description = "Aggregate statistics"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
