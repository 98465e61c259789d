//! Group endpoints: bulk upload, listing and deletion.

use actix_web::{HttpResponse, delete, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::ports::GroupUploadOutcome;
use crate::domain::{Error, Group, GroupFilter, GroupStatus, UserId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::schemas::ListResponse;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::tasks::TaskResponse;
use crate::inbound::http::validation::{
    FieldName, page, parse_optional_choice, parse_optional_uuid, parse_uuid,
};

/// Group as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: Uuid,
    pub vk_group_id: Option<i64>,
    /// Normalised reference as uploaded.
    #[schema(example = "club123")]
    pub screen_name: String,
    pub name: Option<String>,
    pub status: GroupStatus,
    pub status_reason: Option<String>,
    pub upload_task_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            vk_group_id: group.vk_group_id,
            screen_name: group.screen_name,
            name: group.name,
            status: group.status,
            status_reason: group.status_reason,
            upload_task_id: group.upload_task_id,
            created_by: group.created_by,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

/// Body for `POST /api/v1/groups/upload`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UploadGroupsRequest {
    /// Community references separated by newlines, commas or spaces.
    #[schema(example = "https://vk.com/durov\nclub123\n@apiclub")]
    pub groups: String,
}

/// Classification of an upload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupUploadResponse {
    /// Validation task, absent when nothing needed validating.
    pub task: Option<TaskResponse>,
    /// Every row stored for this upload.
    pub groups: Vec<GroupResponse>,
    pub pending: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

impl From<GroupUploadOutcome> for GroupUploadResponse {
    fn from(outcome: GroupUploadOutcome) -> Self {
        Self {
            task: outcome.task.map(TaskResponse::from),
            groups: outcome.groups.into_iter().map(GroupResponse::from).collect(),
            pending: outcome.pending,
            duplicates: outcome.duplicates,
            invalid: outcome.invalid,
        }
    }
}

/// Query string for `GET /api/v1/groups`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct GroupListQuery {
    /// `pending`, `valid`, `invalid` or `duplicate`.
    pub status: Option<String>,
    pub upload_task_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl GroupListQuery {
    fn into_filter(self) -> Result<GroupFilter, Error> {
        Ok(GroupFilter {
            status: parse_optional_choice(self.status.as_deref(), FieldName::new("status"))?,
            upload_task_id: parse_optional_uuid(
                self.upload_task_id.as_deref(),
                FieldName::new("uploadTaskId"),
            )?,
            page: page(self.limit, self.offset)?,
        })
    }
}

/// List groups, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/groups",
    params(GroupListQuery),
    responses(
        (status = 200, description = "Groups", body = ListResponse<GroupResponse>),
        (status = 400, description = "Invalid filter", body = Error)
    ),
    tags = ["groups"],
    operation_id = "listGroups"
)]
#[get("/groups")]
pub async fn list_groups(
    state: web::Data<HttpState>,
    _user: Authenticated,
    query: web::Query<GroupListQuery>,
) -> ApiResult<web::Json<ListResponse<GroupResponse>>> {
    let filter = query.into_inner().into_filter()?;
    let page = filter.page;
    let listing = state.groups_query.list(filter).await?;
    Ok(web::Json(ListResponse::from_listing(
        listing,
        page,
        GroupResponse::from,
    )))
}

/// Store uploaded references and queue their validation.
#[utoipa::path(
    post,
    path = "/api/v1/groups/upload",
    request_body = UploadGroupsRequest,
    responses(
        (status = 202, description = "Upload classified", body = GroupUploadResponse),
        (status = 400, description = "No references supplied", body = Error),
        (status = 503, description = "Queue unavailable", body = Error)
    ),
    tags = ["groups"],
    operation_id = "uploadGroups"
)]
#[post("/groups/upload")]
pub async fn upload_groups(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<UploadGroupsRequest>,
) -> ApiResult<HttpResponse> {
    let outcome = state
        .groups
        .upload(user.principal(), payload.into_inner().groups)
        .await?;
    Ok(HttpResponse::Accepted().json(GroupUploadResponse::from(outcome)))
}

/// Delete a group uploaded by the caller (any group for admins).
#[utoipa::path(
    delete,
    path = "/api/v1/groups/{id}",
    params(("id" = Uuid, Path, description = "Group id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the uploader", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["groups"],
    operation_id = "deleteGroup"
)]
#[delete("/groups/{id}")]
pub async fn delete_group(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_uuid(&path, FieldName::new("id"))?;
    state.groups.delete(user.principal(), id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    //! Handler coverage against mocked group ports.
    use super::*;
    use crate::domain::{Listing, Principal};
    use crate::inbound::http::test_utils::{TEST_BEARER, TestPorts, user_principal};
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use serde_json::{Value, json};

    macro_rules! group_app {
        ($ports:expr) => {
            test::init_service(
                App::new().app_data($ports.into_data()).service(
                    web::scope("/api/v1")
                        .service(list_groups)
                        .service(upload_groups)
                        .service(delete_group),
                ),
            )
            .await
        };
    }

    fn group(principal: &Principal, screen_name: &str, status: GroupStatus) -> Group {
        let now = Utc::now();
        Group {
            id: Uuid::new_v4(),
            vk_group_id: None,
            screen_name: screen_name.to_owned(),
            name: None,
            status,
            status_reason: None,
            upload_task_id: None,
            created_by: Some(principal.user_id),
            created_at: now,
            updated_at: now,
        }
    }

    #[actix_web::test]
    async fn upload_reports_the_classification() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .groups
            .expect_upload()
            .withf(|_, body| body == "durov\n???")
            .returning(|principal, _| {
                Ok(GroupUploadOutcome {
                    task: None,
                    groups: vec![
                        group(principal, "durov", GroupStatus::Pending),
                        group(principal, "???", GroupStatus::Invalid),
                    ],
                    pending: 1,
                    duplicates: 0,
                    invalid: 1,
                })
            });
        let app = group_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/groups/upload")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({"groups": "durov\n???"}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["pending"], 1);
        assert_eq!(body["invalid"], 1);
        assert_eq!(body["task"], Value::Null);
        assert_eq!(body["groups"][1]["status"], "invalid");
    }

    #[actix_web::test]
    async fn list_rejects_unknown_statuses() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports.groups_query.expect_list().never();
        let app = group_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/groups?status=archived")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["details"]["value"], "archived");
    }

    #[actix_web::test]
    async fn list_filters_by_status() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .groups_query
            .expect_list()
            .withf(|filter| filter.status == Some(GroupStatus::Valid))
            .returning(|_| Ok(Listing::default()));
        let app = group_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/groups?status=valid")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn delete_returns_no_content() {
        let id = Uuid::new_v4();
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .groups
            .expect_delete()
            .withf(move |_, group_id| *group_id == id)
            .returning(|_, _| Ok(()));
        let app = group_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::delete()
                .uri(&format!("/api/v1/groups/{id}"))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
