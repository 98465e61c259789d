//! Comment endpoints.
//!
//! ```text
//! GET    /api/v1/comments?postId=…&analyzed=true&search=…&limit=20&offset=0
//! POST   /api/v1/comments {"text":"…","postId":"…"}
//! GET    /api/v1/comments/{id}
//! PUT    /api/v1/comments/{id} {"text":"…"}
//! DELETE /api/v1/comments/{id}
//! POST   /api/v1/comments/{id}/analyze
//! ```

use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{
    Comment, CommentAuthor, CommentFilter, CommentText, Error, KeywordAnalysis, UserId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::schemas::ListResponse;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, comment_text_error, page, parse_optional_uuid, parse_uuid,
};

/// Comment as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub text: String,
    /// Local author; absent for comments collected from VK.
    #[schema(value_type = Option<String>, format = Uuid)]
    pub author_id: Option<UserId>,
    /// VK author id for collected comments.
    pub vk_author_id: Option<i64>,
    pub post_id: Option<Uuid>,
    pub vk_owner_id: Option<i64>,
    pub vk_comment_id: Option<i64>,
    pub analyzed: bool,
    pub matched_keywords: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        let (author_id, vk_author_id) = match comment.author {
            CommentAuthor::User(id) => (Some(id), None),
            CommentAuthor::Vk(id) => (None, Some(id)),
        };
        Self {
            id: comment.id,
            text: comment.text.into(),
            author_id,
            vk_author_id,
            post_id: comment.post_id,
            vk_owner_id: comment.vk.map(|vk| vk.owner_id),
            vk_comment_id: comment.vk.map(|vk| vk.comment_id),
            analyzed: comment.analyzed,
            matched_keywords: comment.matched_keywords,
            published_at: comment.published_at,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// Query string for `GET /api/v1/comments`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct CommentListQuery {
    /// Only comments written by this user.
    pub author_id: Option<String>,
    /// Only comments on this post.
    pub post_id: Option<String>,
    pub analyzed: Option<bool>,
    /// Only comments with (or without) keyword matches.
    pub has_matches: Option<bool>,
    /// Case-insensitive text search.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl CommentListQuery {
    fn into_filter(self) -> Result<CommentFilter, Error> {
        Ok(CommentFilter {
            author_id: parse_optional_uuid(self.author_id.as_deref(), FieldName::new("authorId"))?
                .map(UserId::from_uuid),
            post_id: parse_optional_uuid(self.post_id.as_deref(), FieldName::new("postId"))?,
            analyzed: self.analyzed,
            has_matches: self.has_matches,
            search: self
                .search
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty()),
            page: page(self.limit, self.offset)?,
        })
    }
}

/// Body for `POST /api/v1/comments`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[schema(example = "Great post!")]
    pub text: String,
    pub post_id: Option<Uuid>,
}

/// Body for `PUT /api/v1/comments/{id}`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateCommentRequest {
    pub text: String,
}

fn comment_id(raw: &str) -> Result<Uuid, Error> {
    parse_uuid(raw, FieldName::new("id"))
}

/// List comments, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/comments",
    params(CommentListQuery),
    responses(
        (status = 200, description = "Comments", body = ListResponse<CommentResponse>),
        (status = 400, description = "Invalid filter", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["comments"],
    operation_id = "listComments"
)]
#[get("/comments")]
pub async fn list_comments(
    state: web::Data<HttpState>,
    _user: Authenticated,
    query: web::Query<CommentListQuery>,
) -> ApiResult<web::Json<ListResponse<CommentResponse>>> {
    let filter = query.into_inner().into_filter()?;
    let page = filter.page;
    let listing = state.comments_query.list(filter).await?;
    Ok(web::Json(ListResponse::from_listing(
        listing,
        page,
        CommentResponse::from,
    )))
}

/// Create a comment authored by the caller.
#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Invalid text", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["comments"],
    operation_id = "createComment"
)]
#[post("/comments")]
pub async fn create_comment(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<CreateCommentRequest>,
) -> ApiResult<HttpResponse> {
    let CreateCommentRequest { text, post_id } = payload.into_inner();
    let text = CommentText::new(text).map_err(comment_text_error)?;
    let comment = state
        .comments
        .create(user.principal(), text, post_id)
        .await?;
    Ok(HttpResponse::Created().json(CommentResponse::from(comment)))
}

/// Fetch one comment.
#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment", body = CommentResponse),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["comments"],
    operation_id = "getComment"
)]
#[get("/comments/{id}")]
pub async fn get_comment(
    state: web::Data<HttpState>,
    _user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<web::Json<CommentResponse>> {
    let id = comment_id(&path)?;
    let comment = state.comments_query.get(id).await?;
    Ok(web::Json(comment.into()))
}

/// Replace the text of a comment the caller wrote.
#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated comment", body = CommentResponse),
        (status = 400, description = "Invalid text", body = Error),
        (status = 403, description = "Not the author", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["comments"],
    operation_id = "updateComment"
)]
#[put("/comments/{id}")]
pub async fn update_comment(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
    payload: web::Json<UpdateCommentRequest>,
) -> ApiResult<web::Json<CommentResponse>> {
    let id = comment_id(&path)?;
    let text = CommentText::new(payload.into_inner().text).map_err(comment_text_error)?;
    let comment = state.comments.update(user.principal(), id, text).await?;
    Ok(web::Json(comment.into()))
}

/// Delete a comment the caller wrote.
#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["comments"],
    operation_id = "deleteComment"
)]
#[delete("/comments/{id}")]
pub async fn delete_comment(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = comment_id(&path)?;
    state.comments.delete(user.principal(), id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Count the default keywords in a comment and mark it analyzed.
#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/analyze",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Keyword counts and score", body = KeywordAnalysis),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["comments"],
    operation_id = "analyzeComment"
)]
#[post("/comments/{id}/analyze")]
pub async fn analyze_comment(
    state: web::Data<HttpState>,
    _user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<web::Json<KeywordAnalysis>> {
    let id = comment_id(&path)?;
    let analysis = state.comments.analyze(id).await?;
    Ok(web::Json(analysis))
}

#[cfg(test)]
mod tests {
    //! Handler coverage against mocked comment ports.
    use super::*;
    use crate::domain::{Listing, VkCommentRef};
    use crate::inbound::http::test_utils::{TEST_BEARER, TestPorts, user_principal};
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    fn app(
        ports: TestPorts,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new().app_data(ports.into_data()).service(
            web::scope("/api/v1")
                .service(list_comments)
                .service(create_comment)
                .service(get_comment)
                .service(update_comment)
                .service(delete_comment)
                .service(analyze_comment),
        )
    }

    fn comment(author: CommentAuthor) -> Comment {
        let now = Utc::now();
        Comment {
            id: Uuid::new_v4(),
            text: CommentText::new("Great post!").expect("text"),
            author,
            post_id: None,
            vk: None,
            analyzed: false,
            matched_keywords: Vec::new(),
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[actix_web::test]
    async fn create_returns_201_with_the_author() {
        let principal = user_principal();
        let mut ports = TestPorts::authenticated(principal);
        ports
            .comments
            .expect_create()
            .withf(|_, text, post_id| text.as_str() == "Great post!" && post_id.is_none())
            .returning(|principal, _, _| Ok(comment(CommentAuthor::User(principal.user_id))));
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/comments")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({"text": "  Great post!  "}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["authorId"], principal.user_id.to_string());
        assert_eq!(body["vkAuthorId"], Value::Null);
    }

    #[rstest]
    #[case(String::new(), "empty")]
    #[case("x".repeat(1001), "too_long")]
    #[actix_web::test]
    async fn create_rejects_invalid_lengths(#[case] text: String, #[case] code: &str) {
        let mut ports = TestPorts::authenticated(user_principal());
        ports.comments.expect_create().never();
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/comments")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({ "text": text }))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["details"]["code"], code);
    }

    #[actix_web::test]
    async fn update_by_another_user_is_forbidden() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .comments
            .expect_update()
            .returning(|_, _, _| Err(Error::forbidden("only the author may modify this comment")));
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/v1/comments/{}", Uuid::new_v4()))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({"text": "edited"}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_ids_are_bad_requests() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports.comments_query.expect_get().never();
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/comments/not-a-uuid")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["details"]["code"], "invalid_uuid");
    }

    #[actix_web::test]
    async fn list_passes_filters_and_reports_page_bounds() {
        let post_id = Uuid::new_v4();
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .comments_query
            .expect_list()
            .withf(move |filter| {
                filter.post_id == Some(post_id)
                    && filter.analyzed == Some(true)
                    && filter.search.as_deref() == Some("promo")
                    && filter.page.limit() == 5
            })
            .returning(|_| {
                let mut ingested = comment(CommentAuthor::Vk(77));
                ingested.vk = Some(VkCommentRef {
                    owner_id: -1,
                    comment_id: 9,
                });
                Ok(Listing::new(vec![ingested], 11))
            });
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!(
                    "/api/v1/comments?postId={post_id}&analyzed=true&search=%20promo%20&limit=5"
                ))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["total"], 11);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["items"][0]["vkAuthorId"], 77);
        assert_eq!(body["items"][0]["vkCommentId"], 9);
    }

    #[actix_web::test]
    async fn analyze_returns_counts_and_score() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports.comments.expect_analyze().returning(|_| {
            Ok(KeywordAnalysis {
                counts: BTreeMap::from([("спам".to_owned(), 2), ("скидка".to_owned(), 0)]),
                score: 1,
            })
        });
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/v1/comments/{}/analyze", Uuid::new_v4()))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["score"], 1);
        assert_eq!(body["counts"]["спам"], 2);
    }

    #[actix_web::test]
    async fn requests_without_tokens_are_unauthorized() {
        let mut ports = TestPorts::default();
        ports.comments_query.expect_list().never();
        let app = test::init_service(app(ports)).await;

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/v1/comments").to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
