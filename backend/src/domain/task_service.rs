//! Task creation, dispatch and status use-cases.
//!
//! Postgres holds the authoritative task row. The Redis status snapshot is a
//! read-through cache for polling clients: write failures only log a warning
//! and reads fall back to the repository.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    EnqueueTaskRequest, JobQueue, TaskCommand, TaskQuery, TaskRepository, TaskRepositoryError,
    TaskStatusStore,
};
use crate::domain::{
    Error, JobOptions, Listing, Principal, Task, TaskFilter, TaskParameters, TaskPriority,
    TaskStatusSnapshot, TaskType, UserId,
};

pub(crate) fn map_task_repository_error(error: TaskRepositoryError) -> Error {
    match error {
        TaskRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("task repository unavailable: {message}"))
        }
        TaskRepositoryError::Query { message } => {
            Error::internal(format!("task repository error: {message}"))
        }
    }
}

fn invalid_field(field: &str, message: impl Into<String>) -> Error {
    Error::invalid_request(message).with_details(json!({ "field": field }))
}

/// Job payload for a task: its id and type plus routing metadata.
pub(crate) fn job_payload(task: &Task, parameters: &TaskParameters) -> Value {
    let mut payload = json!({
        "task_id": task.id,
        "task_type": task.task_type,
    });
    if let (Value::Object(target), Value::Object(metadata)) =
        (&mut payload, parameters.job_metadata())
    {
        target.extend(metadata);
    }
    payload
}

/// Mirror a snapshot to the status store, logging failures.
pub(crate) async fn cache_snapshot<S>(store: &S, task: &Task)
where
    S: TaskStatusStore + ?Sized,
{
    if let Err(err) = store.put(&task.snapshot()).await {
        warn!(task_id = %task.id, error = %err, "task status cache write failed");
    }
}

/// Task service implementing the command and query driving ports.
#[derive(Clone)]
pub struct TaskService<R, S, Q> {
    tasks: Arc<R>,
    status_store: Arc<S>,
    queue: Arc<Q>,
    job_defaults: JobOptions,
    clock: Arc<dyn Clock>,
}

impl<R, S, Q> TaskService<R, S, Q> {
    /// Create a task service with default job options.
    pub fn new(
        tasks: Arc<R>,
        status_store: Arc<S>,
        queue: Arc<Q>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            status_store,
            queue,
            job_defaults: JobOptions::default(),
            clock,
        }
    }

    /// Override attempts and backoff for dispatched jobs.
    #[must_use]
    pub fn with_job_defaults(mut self, job_defaults: JobOptions) -> Self {
        self.job_defaults = job_defaults;
        self
    }
}

impl<R, S, Q> TaskService<R, S, Q>
where
    R: TaskRepository,
    S: TaskStatusStore,
    Q: JobQueue,
{
    async fn load_visible(&self, principal: &Principal, id: Uuid) -> Result<Task, Error> {
        let task = self
            .tasks
            .find_by_id(&id)
            .await
            .map_err(map_task_repository_error)?
            .ok_or_else(|| Error::not_found(format!("task {id} not found")))?;
        if !task.is_visible_to(principal) {
            return Err(Error::forbidden("task belongs to another user"));
        }
        Ok(task)
    }
}

#[async_trait]
impl<R, S, Q> TaskCommand for TaskService<R, S, Q>
where
    R: TaskRepository,
    S: TaskStatusStore,
    Q: JobQueue,
{
    async fn enqueue_task(
        &self,
        created_by: Option<UserId>,
        request: EnqueueTaskRequest,
    ) -> Result<Task, Error> {
        let task_type: TaskType = request
            .task_type
            .parse()
            .map_err(|err: crate::domain::TaskValidationError| {
                invalid_field("taskType", err.to_string())
            })?;
        let parameters = TaskParameters::parse(task_type, &request.parameters)
            .map_err(|err| invalid_field("parameters", err.to_string()))?;
        let priority = request
            .priority
            .map(TaskPriority::new)
            .transpose()
            .map_err(|err| invalid_field("priority", err.to_string()))?
            .unwrap_or_default();

        let task = self.create_task(parameters, priority, created_by).await?;
        self.dispatch_task(&task).await?;
        Ok(task)
    }

    async fn create_task(
        &self,
        parameters: TaskParameters,
        priority: TaskPriority,
        created_by: Option<UserId>,
    ) -> Result<Task, Error> {
        let task = Task::new(&parameters, priority, created_by, self.clock.utc());
        self.tasks
            .insert(&task)
            .await
            .map_err(map_task_repository_error)?;
        cache_snapshot(self.status_store.as_ref(), &task).await;
        info!(task_id = %task.id, task_type = %task.task_type, "task created");
        Ok(task)
    }

    async fn dispatch_task(&self, task: &Task) -> Result<(), Error> {
        let parameters = task
            .typed_parameters()
            .map_err(|err| Error::internal(format!("stored task parameters are invalid: {err}")))?;
        let options = JobOptions {
            priority: task.priority.get(),
            ..self.job_defaults
        };
        let queue = task.task_type.queue();
        let job_id = self
            .queue
            .enqueue(
                queue,
                task.task_type.as_str(),
                job_payload(task, &parameters),
                options,
            )
            .await
            .map_err(|err| {
                error!(task_id = %task.id, error = %err, "task dispatch failed");
                Error::service_unavailable(format!("job queue unavailable: {err}"))
            })?;
        info!(task_id = %task.id, job_id = %job_id, queue = %queue, "task dispatched");
        Ok(())
    }
}

#[async_trait]
impl<R, S, Q> TaskQuery for TaskService<R, S, Q>
where
    R: TaskRepository,
    S: TaskStatusStore,
    Q: JobQueue,
{
    async fn get(&self, principal: &Principal, id: Uuid) -> Result<Task, Error> {
        self.load_visible(principal, id).await
    }

    async fn status(&self, principal: &Principal, id: Uuid) -> Result<TaskStatusSnapshot, Error> {
        match self.status_store.get(&id).await {
            Ok(Some(snapshot)) if snapshot.is_visible_to(principal) => return Ok(snapshot),
            Ok(_) => {}
            Err(err) => warn!(task_id = %id, error = %err, "task status cache read failed"),
        }
        let task = self.load_visible(principal, id).await?;
        cache_snapshot(self.status_store.as_ref(), &task).await;
        Ok(task.snapshot())
    }

    async fn list(
        &self,
        principal: &Principal,
        mut filter: TaskFilter,
    ) -> Result<Listing<Task>, Error> {
        if !principal.is_admin() {
            filter.created_by = Some(principal.user_id);
        }
        self.tasks
            .list(&filter)
            .await
            .map_err(map_task_repository_error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ports::{
        JobQueueError, MockJobQueue, MockTaskRepository, MockTaskStatusStore,
        TaskStatusStoreError,
    };
    use crate::domain::test_fixtures::{fixture_clock, principal, task};
    use crate::domain::{ErrorCode, QueueName, Role, TaskStatus};
    use rstest::rstest;

    struct Mocks {
        tasks: MockTaskRepository,
        store: MockTaskStatusStore,
        queue: MockJobQueue,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                tasks: MockTaskRepository::new(),
                store: MockTaskStatusStore::new(),
                queue: MockJobQueue::new(),
            }
        }

        fn into_service(self) -> TaskService<MockTaskRepository, MockTaskStatusStore, MockJobQueue> {
            TaskService::new(
                Arc::new(self.tasks),
                Arc::new(self.store),
                Arc::new(self.queue),
                fixture_clock(),
            )
        }
    }

    fn request(task_type: &str, parameters: Value) -> EnqueueTaskRequest {
        EnqueueTaskRequest {
            task_type: task_type.to_owned(),
            parameters,
            priority: None,
        }
    }

    #[rstest]
    #[case::unknown_type(request("crawl_everything", json!({ "group_id": 1 })))]
    #[case::null_parameters(request("fetch_comments", Value::Null))]
    #[case::empty_parameters(request("fetch_comments", json!({})))]
    #[case::empty_analyze_parameters(request("analyze_posts", json!({})))]
    #[case::bad_priority(EnqueueTaskRequest { priority: Some(0), ..request("fetch_comments", json!({ "group_id": 1 })) })]
    #[tokio::test]
    async fn enqueue_rejects_invalid_requests(#[case] invalid: EnqueueTaskRequest) {
        let mut mocks = Mocks::new();
        mocks.tasks.expect_insert().times(0);
        mocks.queue.expect_enqueue().times(0);
        let err = mocks
            .into_service()
            .enqueue_task(None, invalid)
            .await
            .expect_err("rejected");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn enqueue_persists_caches_and_routes_job() {
        let mut mocks = Mocks::new();
        mocks
            .tasks
            .expect_insert()
            .withf(|task| task.status == TaskStatus::Pending && task.progress == 0)
            .times(1)
            .returning(|_| Ok(()));
        mocks.store.expect_put().times(1).returning(|_| Ok(()));
        mocks
            .queue
            .expect_enqueue()
            .withf(|queue, name, data, options| {
                *queue == QueueName::VkCollect
                    && name == "fetch_comments"
                    && data["group_id"] == json!(77)
                    && data.get("task_id").is_some()
                    && options.priority == 2
            })
            .times(1)
            .returning(|_, _, _, _| Ok("job-1".to_owned()));

        let created = mocks
            .into_service()
            .enqueue_task(
                None,
                EnqueueTaskRequest {
                    task_type: "fetch_comments".to_owned(),
                    parameters: json!({ "group_id": 77 }),
                    priority: Some(2),
                },
            )
            .await
            .expect("enqueued");
        assert_eq!(created.task_type, TaskType::FetchComments);
        assert_eq!(created.parameters["posts_limit"], json!(20));
    }

    #[tokio::test]
    async fn cache_failure_does_not_fail_creation() {
        let mut mocks = Mocks::new();
        mocks.tasks.expect_insert().returning(|_| Ok(()));
        mocks
            .store
            .expect_put()
            .returning(|_| Err(TaskStatusStoreError::connection("redis down")));
        mocks
            .queue
            .expect_enqueue()
            .returning(|_, _, _, _| Ok("job-1".to_owned()));

        let result = mocks
            .into_service()
            .enqueue_task(None, request("analyze_posts", json!({ "limit": 10 })))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn queue_outage_is_service_unavailable() {
        let mut mocks = Mocks::new();
        mocks.tasks.expect_insert().returning(|_| Ok(()));
        mocks.store.expect_put().returning(|_| Ok(()));
        mocks
            .queue
            .expect_enqueue()
            .returning(|_, _, _, _| Err(JobQueueError::unavailable("refused")));

        let err = mocks
            .into_service()
            .enqueue_task(None, request("fetch_comments", json!({ "group_id": 1 })))
            .await
            .expect_err("queue down");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn status_prefers_cached_snapshot() {
        let owner = principal(Role::User);
        let cached = task(TaskType::FetchComments, Some(owner.user_id)).snapshot();
        let mut mocks = Mocks::new();
        let returned = cached.clone();
        mocks
            .store
            .expect_get()
            .returning(move |_| Ok(Some(returned.clone())));
        mocks.tasks.expect_find_by_id().times(0);

        let snapshot = mocks
            .into_service()
            .status(&owner, cached.task_id)
            .await
            .expect("snapshot");
        assert_eq!(snapshot, cached);
    }

    #[tokio::test]
    async fn status_falls_back_to_repository_and_checks_owner() {
        let stored = task(TaskType::ProcessGroups, Some(UserId::random()));
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_get()
            .returning(|_| Err(TaskStatusStoreError::query("decode")));
        mocks
            .tasks
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));

        let err = mocks
            .into_service()
            .status(&principal(Role::User), Uuid::new_v4())
            .await
            .expect_err("someone else's task");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn non_admin_listing_is_scoped_to_own_tasks() {
        let caller = principal(Role::User);
        let user_id = caller.user_id;
        let mut mocks = Mocks::new();
        mocks
            .tasks
            .expect_list()
            .withf(move |filter| filter.created_by == Some(user_id))
            .times(1)
            .returning(|_| Ok(Listing::default()));

        mocks
            .into_service()
            .list(&caller, TaskFilter::default())
            .await
            .expect("listing");
    }
}
