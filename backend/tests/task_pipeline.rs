//! Task lifecycle from enqueue to settlement using in-memory ports.
//!
//! The task service dispatches onto a recording queue; the recorded job is
//! replayed through the worker, which drives the real task processor against
//! in-memory repositories and a scripted VK source.

use std::sync::Arc;
use std::time::Duration;

use mockable::{Clock, DefaultClock};
use serde_json::json;
use uuid::Uuid;
use vk_monitor::domain::ports::{
    EnqueueTaskRequest, TaskCommand, TaskQuery, VkComment, VkPage, VkPost, VkSourceError,
};
use vk_monitor::domain::{
    Comment, CommentAuthor, CommentText, JobEnvelope, Keyword, KeywordCategory, KeywordWord,
    MatchOptions, Principal, Role, TaskProcessor, TaskProcessorConfig, TaskProcessorPorts,
    TaskProcessorRuntime, TaskService, TaskStatus, UserId,
};
use vk_monitor::inbound::worker::{Worker, WorkerConfig};
use vk_monitor::test_support::memory::{
    InMemoryCommentRepository, InMemoryGroupRepository, InMemoryJobSource,
    InMemoryKeywordRepository, InMemoryPostRepository, InMemoryTaskRepository,
    InMemoryTaskStatusStore, RecordingJobQueue, Settled,
};
use vk_monitor::test_support::task_processor::{ImmediateSleeper, NoJitter, ScriptedVkSource};

const GROUP_ID: i64 = 42;

type Tasks = TaskService<InMemoryTaskRepository, InMemoryTaskStatusStore, RecordingJobQueue>;

struct Pipeline {
    clock: Arc<dyn Clock>,
    tasks: Arc<InMemoryTaskRepository>,
    status_store: Arc<InMemoryTaskStatusStore>,
    queue: Arc<RecordingJobQueue>,
    source: Arc<InMemoryJobSource>,
    comments: Arc<InMemoryCommentRepository>,
    posts: Arc<InMemoryPostRepository>,
    keywords: Arc<InMemoryKeywordRepository>,
}

impl Pipeline {
    fn new(comments: InMemoryCommentRepository) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        let keywords = Arc::new(InMemoryKeywordRepository::with_keywords(vec![keyword(
            "promo",
            clock.utc(),
        )]));
        Self {
            comments: Arc::new(comments.counting_into(keywords.clone())),
            keywords,
            clock,
            tasks: Arc::new(InMemoryTaskRepository::default()),
            status_store: Arc::new(InMemoryTaskStatusStore::default()),
            queue: Arc::new(RecordingJobQueue::default()),
            source: Arc::new(InMemoryJobSource::default()),
            posts: Arc::new(InMemoryPostRepository::default()),
        }
    }

    fn service(&self) -> Tasks {
        TaskService::new(
            self.tasks.clone(),
            self.status_store.clone(),
            self.queue.clone(),
            self.clock.clone(),
        )
    }

    /// Move every recorded dispatch onto the consumer side of the queue.
    fn deliver(&self) {
        for recorded in self.queue.jobs() {
            self.source.push(JobEnvelope::new(
                recorded.queue,
                recorded.name,
                recorded.data,
                &recorded.options,
                0,
            ));
        }
    }

    fn worker(&self, vk: ScriptedVkSource) -> Worker {
        let processor = TaskProcessor::with_runtime(
            TaskProcessorPorts {
                tasks: self.tasks.clone(),
                status_store: self.status_store.clone(),
                comments: self.comments.clone(),
                posts: self.posts.clone(),
                keywords: self.keywords.clone(),
                groups: Arc::new(InMemoryGroupRepository::default()),
                vk: Arc::new(vk),
            },
            self.clock.clone(),
            TaskProcessorRuntime {
                sleeper: Arc::new(ImmediateSleeper),
                jitter: Arc::new(NoJitter),
            },
            TaskProcessorConfig::default(),
        );
        Worker::new(
            self.source.clone(),
            Arc::new(processor),
            WorkerConfig {
                concurrency: 1,
                poll_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        )
    }
}

fn keyword(word: &str, now: chrono::DateTime<chrono::Utc>) -> Keyword {
    Keyword {
        id: Uuid::new_v4(),
        word: KeywordWord::new(word).expect("valid word"),
        category: KeywordCategory::default(),
        is_active: true,
        options: MatchOptions::default(),
        match_count: 0,
        created_at: now,
        updated_at: now,
    }
}

fn user_comment(author: UserId, text: &str, now: chrono::DateTime<chrono::Utc>) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        text: CommentText::new(text).expect("valid text"),
        author: CommentAuthor::User(author),
        post_id: None,
        vk: None,
        analyzed: false,
        matched_keywords: Vec::new(),
        published_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn owner(user_id: UserId) -> Principal {
    Principal {
        user_id,
        role: Role::User,
    }
}

fn vk_post(id: i64, comments_count: i64) -> VkPost {
    VkPost {
        id,
        owner_id: -GROUP_ID,
        text: format!("post {id}"),
        comments_count,
        date: 1_700_000_000 + id,
    }
}

fn vk_comment(id: i64, text: &str) -> VkComment {
    VkComment {
        id,
        from_id: 500 + id,
        text: text.to_owned(),
        date: 1_700_000_500 + id,
        deleted: false,
    }
}

#[tokio::test]
async fn fetch_comments_runs_from_enqueue_to_ack() {
    let pipeline = Pipeline::new(InMemoryCommentRepository::default());
    let user = UserId::random();
    let service = pipeline.service();

    let task = service
        .enqueue_task(
            Some(user),
            EnqueueTaskRequest {
                task_type: "fetch_comments".to_owned(),
                parameters: json!({ "group_id": GROUP_ID, "posts_limit": 1 }),
                priority: Some(2),
            },
        )
        .await
        .expect("task enqueued");
    assert_eq!(task.status, TaskStatus::Pending);
    let recorded = pipeline.queue.jobs();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].options.priority, 2);
    assert_eq!(recorded[0].data["task_id"], json!(task.id));

    pipeline.deliver();
    let vk = ScriptedVkSource::default()
        .with_posts(Ok(VkPage {
            count: 1,
            items: vec![vk_post(7, 2)],
        }))
        .with_comments(Ok(VkPage {
            count: 2,
            items: vec![vk_comment(1, "promo code inside"), vk_comment(2, "thanks")],
        }));
    let worked = pipeline
        .worker(vk)
        .process_next()
        .await
        .expect("queue reachable");
    assert!(worked);

    let settled = pipeline.source.settled();
    assert!(matches!(settled.as_slice(), [Settled::Acked(_)]));

    let snapshot = service
        .status(&owner(user), task.id)
        .await
        .expect("status visible to owner");
    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert_eq!(snapshot.progress, 100);

    let stored = service.get(&owner(user), task.id).await.expect("task");
    let result = stored.result.expect("result recorded");
    assert_eq!(result["comments_inserted"], 2);
    assert_eq!(result["keyword_matches"], 1);
    assert_eq!(pipeline.posts.all().len(), 1);
    assert_eq!(pipeline.keywords.all()[0].match_count, 1);
}

#[tokio::test]
async fn rate_limited_job_is_retried_and_then_completes() {
    let pipeline = Pipeline::new(InMemoryCommentRepository::default());
    let user = UserId::random();
    let service = pipeline.service();
    let task = service
        .enqueue_task(
            Some(user),
            EnqueueTaskRequest {
                task_type: "fetch_comments".to_owned(),
                parameters: json!({ "group_id": GROUP_ID }),
                priority: None,
            },
        )
        .await
        .expect("task enqueued");
    pipeline.deliver();

    let limited = (0..3).fold(ScriptedVkSource::default(), |vk, _| {
        vk.with_posts(Err(VkSourceError::api(29_i64, "Rate limit reached")))
    });
    assert!(pipeline.worker(limited).process_next().await.expect("first pass"));
    assert!(matches!(
        pipeline.source.settled().as_slice(),
        [Settled::Retried { .. }]
    ));
    let interim = service.status(&owner(user), task.id).await.expect("status");
    assert_eq!(interim.status, TaskStatus::Processing);

    let recovered = ScriptedVkSource::default().with_posts(Ok(VkPage {
        count: 0,
        items: Vec::new(),
    }));
    assert!(pipeline.worker(recovered).process_next().await.expect("second pass"));
    assert!(matches!(
        pipeline.source.settled().as_slice(),
        [Settled::Retried { .. }, Settled::Acked(_)]
    ));
    let done = service.get(&owner(user), task.id).await.expect("task");
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.error.is_none());
}

#[tokio::test]
async fn analyze_posts_marks_stored_comments() {
    let author = UserId::random();
    let now = DefaultClock.utc();
    let pipeline = Pipeline::new(InMemoryCommentRepository::with_comments(vec![
        user_comment(author, "weekly PROMO thread", now),
        user_comment(author, "unrelated", now),
    ]));
    let service = pipeline.service();
    let task = service
        .enqueue_task(
            Some(author),
            EnqueueTaskRequest {
                task_type: "analyze_posts".to_owned(),
                parameters: json!({ "limit": 10 }),
                priority: None,
            },
        )
        .await
        .expect("task enqueued");
    pipeline.deliver();

    assert!(
        pipeline
            .worker(ScriptedVkSource::default())
            .process_next()
            .await
            .expect("queue reachable")
    );

    let stored = service.get(&owner(author), task.id).await.expect("task");
    assert_eq!(
        stored.result,
        Some(json!({ "comments_analyzed": 2, "keyword_matches": 1 }))
    );
    assert!(pipeline.comments.all().iter().all(|comment| comment.analyzed));
}

#[tokio::test]
async fn other_users_cannot_read_the_task() {
    let pipeline = Pipeline::new(InMemoryCommentRepository::default());
    let service = pipeline.service();
    let task = service
        .enqueue_task(
            Some(UserId::random()),
            EnqueueTaskRequest {
                task_type: "analyze_posts".to_owned(),
                parameters: json!({}),
                priority: None,
            },
        )
        .await
        .expect("task enqueued");

    let err = service
        .status(&owner(UserId::random()), task.id)
        .await
        .expect_err("foreign task");
    assert_eq!(err.code(), vk_monitor::domain::ErrorCode::Forbidden);
}
