//! Post listing endpoint.

use actix_web::{get, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{Error, Post, PostFilter};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::schemas::ListResponse;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, page, parse_optional_uuid};

/// Wall post collected from VK.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    /// Wall owner; negative for communities.
    pub owner_id: i64,
    pub vk_post_id: i64,
    pub group_id: Option<Uuid>,
    pub text: String,
    pub comments_count: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            owner_id: post.owner_id,
            vk_post_id: post.vk_post_id,
            group_id: post.group_id,
            text: post.text,
            comments_count: post.comments_count,
            published_at: post.published_at,
            created_at: post.created_at,
        }
    }
}

/// Query string for `GET /api/v1/posts`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct PostListQuery {
    pub group_id: Option<String>,
    pub owner_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PostListQuery {
    fn into_filter(self) -> Result<PostFilter, Error> {
        Ok(PostFilter {
            group_id: parse_optional_uuid(self.group_id.as_deref(), FieldName::new("groupId"))?,
            owner_id: self.owner_id,
            page: page(self.limit, self.offset)?,
        })
    }
}

/// List stored posts, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(PostListQuery),
    responses(
        (status = 200, description = "Posts", body = ListResponse<PostResponse>),
        (status = 400, description = "Invalid filter", body = Error)
    ),
    tags = ["posts"],
    operation_id = "listPosts"
)]
#[get("/posts")]
pub async fn list_posts(
    state: web::Data<HttpState>,
    _user: Authenticated,
    query: web::Query<PostListQuery>,
) -> ApiResult<web::Json<ListResponse<PostResponse>>> {
    let filter = query.into_inner().into_filter()?;
    let page = filter.page;
    let listing = state.posts.list(filter).await?;
    Ok(web::Json(ListResponse::from_listing(
        listing,
        page,
        PostResponse::from,
    )))
}
