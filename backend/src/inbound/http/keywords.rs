//! Keyword endpoints.
//!
//! Reads are open to any authenticated user; mutations require an admin,
//! which the keyword service enforces.

use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::ports::BulkKeywordOutcome;
use crate::domain::{
    Error, Keyword, KeywordCategory, KeywordDraft, KeywordFilter, KeywordPatch, KeywordWord,
    MatchOptions,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::schemas::ListResponse;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, keyword_error, page, parse_uuid};

/// Keyword as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeywordResponse {
    pub id: Uuid,
    #[schema(example = "розыгрыш")]
    pub word: String,
    #[schema(example = "general")]
    pub category: String,
    pub is_active: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    /// Comments matched so far.
    pub match_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Keyword> for KeywordResponse {
    fn from(keyword: Keyword) -> Self {
        Self {
            id: keyword.id,
            word: keyword.word.into(),
            category: keyword.category.into(),
            is_active: keyword.is_active,
            case_sensitive: keyword.options.case_sensitive,
            whole_word: keyword.options.whole_word,
            match_count: keyword.match_count,
            created_at: keyword.created_at,
            updated_at: keyword.updated_at,
        }
    }
}

/// Query string for `GET /api/v1/keywords`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct KeywordListQuery {
    pub category: Option<String>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring of the word.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl KeywordListQuery {
    fn into_filter(self) -> Result<KeywordFilter, Error> {
        Ok(KeywordFilter {
            category: self
                .category
                .map(KeywordCategory::new)
                .transpose()
                .map_err(keyword_error)?,
            is_active: self.is_active,
            search: self
                .search
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty()),
            page: page(self.limit, self.offset)?,
        })
    }
}

/// Body for `POST /api/v1/keywords`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeywordRequest {
    pub word: String,
    /// Defaults to `general`.
    pub category: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

/// Body for `POST /api/v1/keywords/bulk`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkKeywordRequest {
    /// Newline separated words.
    #[schema(example = "спам\nреклама")]
    pub words: String,
    pub category: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

/// Counts reported by a bulk create.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkKeywordResponse {
    pub created: usize,
    pub skipped: usize,
}

impl From<BulkKeywordOutcome> for BulkKeywordResponse {
    fn from(outcome: BulkKeywordOutcome) -> Self {
        Self {
            created: outcome.created,
            skipped: outcome.skipped,
        }
    }
}

/// Body for `PUT /api/v1/keywords/{id}`; absent fields stay unchanged.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeywordRequest {
    pub word: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub case_sensitive: Option<bool>,
    pub whole_word: Option<bool>,
}

impl UpdateKeywordRequest {
    fn into_patch(self) -> Result<KeywordPatch, Error> {
        Ok(KeywordPatch {
            word: self
                .word
                .map(KeywordWord::new)
                .transpose()
                .map_err(keyword_error)?,
            category: self
                .category
                .map(KeywordCategory::new)
                .transpose()
                .map_err(keyword_error)?,
            is_active: self.is_active,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
        })
    }
}

fn category_or_default(raw: Option<String>) -> Result<KeywordCategory, Error> {
    raw.map_or_else(
        || Ok(KeywordCategory::default()),
        |value| KeywordCategory::new(value).map_err(keyword_error),
    )
}

fn keyword_id(raw: &str) -> Result<Uuid, Error> {
    parse_uuid(raw, FieldName::new("id"))
}

/// List keywords alphabetically.
#[utoipa::path(
    get,
    path = "/api/v1/keywords",
    params(KeywordListQuery),
    responses(
        (status = 200, description = "Keywords", body = ListResponse<KeywordResponse>),
        (status = 400, description = "Invalid filter", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "listKeywords"
)]
#[get("/keywords")]
pub async fn list_keywords(
    state: web::Data<HttpState>,
    _user: Authenticated,
    query: web::Query<KeywordListQuery>,
) -> ApiResult<web::Json<ListResponse<KeywordResponse>>> {
    let filter = query.into_inner().into_filter()?;
    let page = filter.page;
    let listing = state.keywords_query.list(filter).await?;
    Ok(web::Json(ListResponse::from_listing(
        listing,
        page,
        KeywordResponse::from,
    )))
}

/// Create one keyword.
#[utoipa::path(
    post,
    path = "/api/v1/keywords",
    request_body = CreateKeywordRequest,
    responses(
        (status = 201, description = "Keyword created", body = KeywordResponse),
        (status = 400, description = "Invalid keyword", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 409, description = "Keyword already exists", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "createKeyword"
)]
#[post("/keywords")]
pub async fn create_keyword(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<CreateKeywordRequest>,
) -> ApiResult<HttpResponse> {
    let request = payload.into_inner();
    let draft = KeywordDraft {
        word: KeywordWord::new(request.word).map_err(keyword_error)?,
        category: category_or_default(request.category)?,
        is_active: request.is_active.unwrap_or(true),
        options: MatchOptions {
            case_sensitive: request.case_sensitive,
            whole_word: request.whole_word,
        },
    };
    let keyword = state.keywords.create(user.principal(), draft).await?;
    Ok(HttpResponse::Created().json(KeywordResponse::from(keyword)))
}

/// Create many keywords from a newline separated list.
#[utoipa::path(
    post,
    path = "/api/v1/keywords/bulk",
    request_body = BulkKeywordRequest,
    responses(
        (status = 200, description = "Created and skipped counts", body = BulkKeywordResponse),
        (status = 400, description = "Invalid category", body = Error),
        (status = 403, description = "Admin role required", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "bulkCreateKeywords"
)]
#[post("/keywords/bulk")]
pub async fn bulk_create_keywords(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<BulkKeywordRequest>,
) -> ApiResult<web::Json<BulkKeywordResponse>> {
    let request = payload.into_inner();
    let category = category_or_default(request.category)?;
    let options = MatchOptions {
        case_sensitive: request.case_sensitive,
        whole_word: request.whole_word,
    };
    let outcome = state
        .keywords
        .bulk_create(user.principal(), request.words, category, options)
        .await?;
    Ok(web::Json(outcome.into()))
}

/// Fetch one keyword.
#[utoipa::path(
    get,
    path = "/api/v1/keywords/{id}",
    params(("id" = Uuid, Path, description = "Keyword id")),
    responses(
        (status = 200, description = "Keyword", body = KeywordResponse),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "getKeyword"
)]
#[get("/keywords/{id}")]
pub async fn get_keyword(
    state: web::Data<HttpState>,
    _user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<web::Json<KeywordResponse>> {
    let id = keyword_id(&path)?;
    let keyword = state.keywords_query.get(id).await?;
    Ok(web::Json(keyword.into()))
}

/// Partially update a keyword.
#[utoipa::path(
    put,
    path = "/api/v1/keywords/{id}",
    params(("id" = Uuid, Path, description = "Keyword id")),
    request_body = UpdateKeywordRequest,
    responses(
        (status = 200, description = "Updated keyword", body = KeywordResponse),
        (status = 400, description = "Invalid field", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 404, description = "Not found", body = Error),
        (status = 409, description = "Keyword already exists", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "updateKeyword"
)]
#[put("/keywords/{id}")]
pub async fn update_keyword(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
    payload: web::Json<UpdateKeywordRequest>,
) -> ApiResult<web::Json<KeywordResponse>> {
    let id = keyword_id(&path)?;
    let patch = payload.into_inner().into_patch()?;
    let keyword = state.keywords.update(user.principal(), id, patch).await?;
    Ok(web::Json(keyword.into()))
}

/// Delete a keyword.
#[utoipa::path(
    delete,
    path = "/api/v1/keywords/{id}",
    params(("id" = Uuid, Path, description = "Keyword id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admin role required", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["keywords"],
    operation_id = "deleteKeyword"
)]
#[delete("/keywords/{id}")]
pub async fn delete_keyword(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = keyword_id(&path)?;
    state.keywords.delete(user.principal(), id).await?;
    Ok(HttpResponse::NoContent().finish())
}
