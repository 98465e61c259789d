//! Task endpoints.
//!
//! ```text
//! POST /api/v1/tasks {"taskType":"fetch_comments","parameters":{"group_id":1}}
//! GET  /api/v1/tasks?status=processing&taskType=fetch_comments
//! GET  /api/v1/tasks/{id}
//! GET  /api/v1/tasks/{id}/status
//! ```

use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::ports::EnqueueTaskRequest;
use crate::domain::{
    Error, Task, TaskFilter, TaskStatus, TaskStatusSnapshot, TaskType, UserId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::schemas::ListResponse;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, page, parse_optional_choice, parse_optional_uuid, parse_uuid,
};

/// Task as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// 1 (highest) to 10.
    pub priority: u8,
    /// Completion percentage.
    pub progress: u8,
    #[schema(value_type = Object)]
    pub parameters: Value,
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    pub error: Option<String>,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            status: task.status,
            priority: task.priority.get(),
            progress: task.progress,
            parameters: task.parameters,
            result: task.result,
            error: task.error,
            created_by: task.created_by,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            updated_at: task.updated_at,
        }
    }
}

/// Body for `POST /api/v1/tasks`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueTaskBody {
    /// `fetch_comments`, `process_groups` or `analyze_posts`.
    #[schema(example = "fetch_comments")]
    pub task_type: String,
    /// Type-specific parameters.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub parameters: Value,
    /// 1 (highest) to 10; defaults to 5.
    pub priority: Option<u8>,
}

/// Query string for `GET /api/v1/tasks`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub task_type: Option<String>,
    /// Admins only; other callers always see their own tasks.
    pub created_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TaskListQuery {
    fn into_filter(self) -> Result<TaskFilter, Error> {
        Ok(TaskFilter {
            status: parse_optional_choice(self.status.as_deref(), FieldName::new("status"))?,
            task_type: parse_optional_choice(
                self.task_type.as_deref(),
                FieldName::new("taskType"),
            )?,
            created_by: parse_optional_uuid(
                self.created_by.as_deref(),
                FieldName::new("createdBy"),
            )?
            .map(UserId::from_uuid),
            page: page(self.limit, self.offset)?,
        })
    }
}

fn task_id(raw: &str) -> Result<Uuid, Error> {
    parse_uuid(raw, FieldName::new("id"))
}

/// Validate, persist and enqueue a task.
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = EnqueueTaskBody,
    responses(
        (status = 202, description = "Task queued", body = TaskResponse),
        (status = 400, description = "Unknown type or invalid parameters", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 503, description = "Queue unavailable", body = Error)
    ),
    tags = ["tasks"],
    operation_id = "enqueueTask"
)]
#[post("/tasks")]
pub async fn enqueue_task(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<EnqueueTaskBody>,
) -> ApiResult<HttpResponse> {
    let EnqueueTaskBody {
        task_type,
        parameters,
        priority,
    } = payload.into_inner();
    let task = state
        .tasks
        .enqueue_task(
            Some(user.principal().user_id),
            EnqueueTaskRequest {
                task_type,
                parameters,
                priority,
            },
        )
        .await?;
    Ok(HttpResponse::Accepted().json(TaskResponse::from(task)))
}

/// List tasks visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Tasks", body = ListResponse<TaskResponse>),
        (status = 400, description = "Invalid filter", body = Error)
    ),
    tags = ["tasks"],
    operation_id = "listTasks"
)]
#[get("/tasks")]
pub async fn list_tasks(
    state: web::Data<HttpState>,
    user: Authenticated,
    query: web::Query<TaskListQuery>,
) -> ApiResult<web::Json<ListResponse<TaskResponse>>> {
    let filter = query.into_inner().into_filter()?;
    let page = filter.page;
    let listing = state.tasks_query.list(user.principal(), filter).await?;
    Ok(web::Json(ListResponse::from_listing(
        listing,
        page,
        TaskResponse::from,
    )))
}

/// Full task record, including its result.
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["tasks"],
    operation_id = "getTask"
)]
#[get("/tasks/{id}")]
pub async fn get_task(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<web::Json<TaskResponse>> {
    let id = task_id(&path)?;
    let task = state.tasks_query.get(user.principal(), id).await?;
    Ok(web::Json(task.into()))
}

/// Lightweight status for polling, served from Redis when cached.
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/status",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Status snapshot", body = TaskStatusSnapshot),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["tasks"],
    operation_id = "getTaskStatus"
)]
#[get("/tasks/{id}/status")]
pub async fn get_task_status(
    state: web::Data<HttpState>,
    user: Authenticated,
    path: web::Path<String>,
) -> ApiResult<web::Json<TaskStatusSnapshot>> {
    let id = task_id(&path)?;
    let snapshot = state.tasks_query.status(user.principal(), id).await?;
    Ok(web::Json(snapshot))
}

#[cfg(test)]
mod tests {
    //! Handler coverage against mocked task ports.
    use super::*;
    use crate::domain::{Listing, TaskParameters, TaskPriority};
    use crate::inbound::http::test_utils::{TEST_BEARER, TestPorts, user_principal};
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use serde_json::json;

    macro_rules! task_app {
        ($ports:expr) => {
            test::init_service(
                App::new().app_data($ports.into_data()).service(
                    web::scope("/api/v1")
                        .service(enqueue_task)
                        .service(list_tasks)
                        .service(get_task_status)
                        .service(get_task),
                ),
            )
            .await
        };
    }

    fn fetch_task(created_by: Option<UserId>) -> Task {
        let parameters =
            TaskParameters::parse(TaskType::FetchComments, &json!({"group_id": 1})).expect("params");
        Task::new(&parameters, TaskPriority::default(), created_by, Utc::now())
    }

    #[actix_web::test]
    async fn enqueue_returns_accepted_with_the_pending_task() {
        let principal = user_principal();
        let mut ports = TestPorts::authenticated(principal);
        ports
            .tasks
            .expect_enqueue_task()
            .withf(move |created_by, request| {
                *created_by == Some(principal.user_id)
                    && request.task_type == "fetch_comments"
                    && request.parameters == json!({"group_id": 1})
                    && request.priority.is_none()
            })
            .returning(|created_by, _| Ok(fetch_task(created_by)));
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/tasks")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({"taskType": "fetch_comments", "parameters": {"group_id": 1}}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["taskType"], "fetch_comments");
        assert_eq!(body["progress"], 0);
        assert_eq!(body["priority"], 5);
    }

    #[actix_web::test]
    async fn enqueue_surfaces_validation_errors() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .tasks
            .expect_enqueue_task()
            .returning(|_, _| Err(Error::invalid_request("unknown task type: reindex")));
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/tasks")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .set_json(json!({"taskType": "reindex", "parameters": {"x": 1}}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn status_returns_the_snapshot() {
        let principal = user_principal();
        let task = fetch_task(Some(principal.user_id));
        let snapshot = task.snapshot();
        let task_id = task.id;
        let mut ports = TestPorts::authenticated(principal);
        ports
            .tasks_query
            .expect_status()
            .withf(move |_, id| *id == task_id)
            .returning(move |_, _| Ok(snapshot.clone()));
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/v1/tasks/{task_id}/status"))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["taskId"], task_id.to_string());
        assert_eq!(body["status"], "pending");
    }

    #[actix_web::test]
    async fn foreign_tasks_are_forbidden() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .tasks_query
            .expect_get()
            .returning(|_, _| Err(Error::forbidden("task belongs to another user")));
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/v1/tasks/{}", Uuid::new_v4()))
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn list_parses_status_and_type() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports
            .tasks_query
            .expect_list()
            .withf(|_, filter| {
                filter.status == Some(TaskStatus::Failed)
                    && filter.task_type == Some(TaskType::ProcessGroups)
            })
            .returning(|_, _| Ok(Listing::default()));
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/tasks?status=failed&taskType=process_groups")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn unknown_status_filters_are_rejected() {
        let mut ports = TestPorts::authenticated(user_principal());
        ports.tasks_query.expect_list().never();
        let app = task_app!(ports);

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/tasks?status=done")
                .insert_header((AUTHORIZATION, TEST_BEARER))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["details"]["field"], "status");
    }
}
