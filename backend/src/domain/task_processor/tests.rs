//! Unit tests for task processor orchestration.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use uuid::Uuid;

use super::{TaskProcessor, TaskProcessorConfig, TaskProcessorPorts, TaskProcessorRuntime};
use crate::domain::ports::{
    GroupRepository, JobHandler, MockGroupRepository, VkComment, VkGroup, VkPage, VkPost,
    VkSourceError,
};
use crate::domain::test_fixtures::{fixture_clock, fixture_timestamp, keyword, user_comment};
use crate::domain::{
    ALREADY_MONITORED_REASON, CommentAuthor, Group, GroupResolution, GroupStatus, JobEnvelope,
    JobOptions, Task, TaskParameters, TaskPriority, TaskStatus, TaskType, UserId,
};
use crate::test_support::memory::{
    InMemoryCommentRepository, InMemoryGroupRepository, InMemoryKeywordRepository,
    InMemoryPostRepository, InMemoryTaskRepository, InMemoryTaskStatusStore,
};
use crate::test_support::task_processor::{NoJitter, RecordingSleeper, ScriptedVkSource};

const GROUP_ID: i64 = 42;

struct Harness {
    tasks: Arc<InMemoryTaskRepository>,
    status_store: Arc<InMemoryTaskStatusStore>,
    comments: Arc<InMemoryCommentRepository>,
    posts: Arc<InMemoryPostRepository>,
    keywords: Arc<InMemoryKeywordRepository>,
    groups: Arc<InMemoryGroupRepository>,
    vk: Arc<ScriptedVkSource>,
    sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    fn new(task: &Task, vk: ScriptedVkSource) -> Self {
        let keywords = Arc::new(InMemoryKeywordRepository::with_keywords(vec![keyword("promo")]));
        Self {
            tasks: Arc::new(InMemoryTaskRepository::with_task(task.clone())),
            status_store: Arc::new(InMemoryTaskStatusStore::default()),
            comments: Arc::new(InMemoryCommentRepository::default().counting_into(keywords.clone())),
            posts: Arc::new(InMemoryPostRepository::default()),
            keywords,
            groups: Arc::new(InMemoryGroupRepository::default()),
            vk: Arc::new(vk),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    fn with_comments(mut self, comments: InMemoryCommentRepository) -> Self {
        self.comments = Arc::new(comments.counting_into(self.keywords.clone()));
        self
    }

    fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = Arc::new(InMemoryGroupRepository::with_groups(groups));
        self
    }

    fn processor(&self) -> TaskProcessor {
        self.processor_with_groups(self.groups.clone())
    }

    fn processor_with_groups(&self, groups: Arc<dyn GroupRepository>) -> TaskProcessor {
        TaskProcessor::with_runtime(
            TaskProcessorPorts {
                tasks: self.tasks.clone(),
                status_store: self.status_store.clone(),
                comments: self.comments.clone(),
                posts: self.posts.clone(),
                keywords: self.keywords.clone(),
                groups,
                vk: self.vk.clone(),
            },
            fixture_clock(),
            TaskProcessorRuntime {
                sleeper: self.sleeper.clone(),
                jitter: Arc::new(NoJitter),
            },
            TaskProcessorConfig {
                vk_max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(1),
            },
        )
    }

    fn stored(&self, task: &Task) -> Task {
        self.tasks.get(&task.id).expect("task stored")
    }
}

fn task_for(task_type: TaskType, raw: serde_json::Value) -> Task {
    let parameters = TaskParameters::parse(task_type, &raw).expect("valid parameters");
    Task::new(
        &parameters,
        TaskPriority::default(),
        Some(UserId::random()),
        fixture_timestamp(),
    )
}

fn job_for(task: &Task, attempts_made: u32) -> JobEnvelope {
    let mut job = JobEnvelope::new(
        task.task_type.queue(),
        task.task_type.as_str(),
        json!({ "task_id": task.id, "task_type": task.task_type }),
        &JobOptions::default(),
        0,
    );
    job.attempts_made = attempts_made;
    job
}

fn post(id: i64, comments_count: i64) -> VkPost {
    VkPost {
        id,
        owner_id: -GROUP_ID,
        text: format!("post {id}"),
        comments_count,
        date: 1_700_000_000 + id,
    }
}

fn comment(id: i64, text: &str) -> VkComment {
    VkComment {
        id,
        from_id: 1_000 + id,
        text: text.to_owned(),
        date: 1_700_000_100 + id,
        deleted: false,
    }
}

fn page<T>(count: i64, items: Vec<T>) -> VkPage<T> {
    VkPage { count, items }
}

fn group(screen_name: &str, vk_group_id: Option<i64>, status: GroupStatus) -> Group {
    Group {
        id: Uuid::new_v4(),
        vk_group_id,
        screen_name: screen_name.to_owned(),
        name: None,
        status,
        status_reason: None,
        upload_task_id: None,
        created_by: None,
        created_at: fixture_timestamp(),
        updated_at: fixture_timestamp(),
    }
}

#[tokio::test]
async fn fetch_comments_stores_posts_comments_and_counts() {
    let task = task_for(
        TaskType::FetchComments,
        json!({ "group_id": GROUP_ID, "posts_limit": 2 }),
    );
    let mut deleted = comment(3, "gone");
    deleted.deleted = true;
    let vk = ScriptedVkSource::default()
        .with_posts(Ok(page(10, vec![post(1, 3), post(2, 0)])))
        .with_comments(Ok(page(
            3,
            vec![comment(1, "PROMO inside"), comment(2, "hello"), deleted],
        )));
    let harness = Harness::new(&task, vk);

    harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect("job succeeds");

    let stored = harness.stored(&task);
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(
        stored.result,
        Some(json!({
            "posts_processed": 2,
            "comments_fetched": 3,
            "comments_inserted": 2,
            "duplicates_skipped": 0,
            "keyword_matches": 1,
        }))
    );
    assert_eq!(harness.posts.all().len(), 2);
    let comments = harness.comments.all();
    assert_eq!(comments.len(), 2);
    assert!(comments.iter().all(|c| matches!(c.author, CommentAuthor::Vk(_))));
    assert_eq!(harness.keywords.all()[0].match_count, 1);

    let snapshot = harness
        .status_store
        .snapshot(&task.id)
        .expect("snapshot cached");
    assert_eq!(snapshot.status, TaskStatus::Completed);
}

#[tokio::test]
async fn fetch_comments_skips_duplicates_and_their_counters() {
    let task = task_for(
        TaskType::FetchComments,
        json!({ "group_id": GROUP_ID, "post_id": 1 }),
    );
    let vk = ScriptedVkSource::default()
        .with_post(Ok(Some(post(1, 1))))
        .with_comments(Ok(page(1, vec![comment(1, "promo again")])));
    let harness = Harness::new(&task, vk);
    let first = harness.processor();
    first.handle(&job_for(&task, 0)).await.expect("first run");

    let rerun = task_for(
        TaskType::FetchComments,
        json!({ "group_id": GROUP_ID, "post_id": 1 }),
    );
    harness.tasks.insert_task(rerun.clone());
    let vk = ScriptedVkSource::default()
        .with_post(Ok(Some(post(1, 1))))
        .with_comments(Ok(page(1, vec![comment(1, "promo again")])));
    let second = Harness {
        vk: Arc::new(vk),
        ..harness
    };
    second
        .processor()
        .handle(&job_for(&rerun, 0))
        .await
        .expect("second run");

    let result = second.stored(&rerun).result.expect("result");
    assert_eq!(result["comments_inserted"], 0);
    assert_eq!(result["duplicates_skipped"], 1);
    assert_eq!(result["keyword_matches"], 0);
    assert_eq!(second.keywords.all()[0].match_count, 1);
}

#[tokio::test]
async fn missing_single_post_fails_permanently() {
    let task = task_for(
        TaskType::FetchComments,
        json!({ "group_id": GROUP_ID, "post_id": 9 }),
    );
    let harness = Harness::new(&task, ScriptedVkSource::default().with_post(Ok(None)));

    let error = harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect_err("post missing");
    assert!(!error.retryable);
    let stored = harness.stored(&task);
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.error.as_deref().is_some_and(|e| e.contains("not found")));
}

#[tokio::test]
async fn retryable_vk_errors_are_retried_within_the_call() {
    let task = task_for(TaskType::FetchComments, json!({ "group_id": GROUP_ID }));
    let vk = ScriptedVkSource::default()
        .with_posts(Err(VkSourceError::api(6_i64, "Too many requests per second")))
        .with_posts(Err(VkSourceError::timeout("30s")))
        .with_posts(Ok(page(0, Vec::new())));
    let harness = Harness::new(&task, vk);

    harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect("third call succeeds");

    assert_eq!(
        harness.sleeper.recorded(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert_eq!(harness.stored(&task).status, TaskStatus::Completed);
}

#[rstest]
#[case::attempts_left(0, true, TaskStatus::Processing)]
#[case::last_attempt(2, false, TaskStatus::Failed)]
#[tokio::test]
async fn exhausted_rate_limit_depends_on_job_attempts(
    #[case] attempts_made: u32,
    #[case] expect_retry: bool,
    #[case] expected_status: TaskStatus,
) {
    let task = task_for(TaskType::FetchComments, json!({ "group_id": GROUP_ID }));
    let vk = (0..3).fold(ScriptedVkSource::default(), |vk, _| {
        vk.with_posts(Err(VkSourceError::api(29_i64, "Rate limit reached")))
    });
    let harness = Harness::new(&task, vk);

    let error = harness
        .processor()
        .handle(&job_for(&task, attempts_made))
        .await
        .expect_err("rate limited");

    assert_eq!(error.retryable, expect_retry);
    let stored = harness.stored(&task);
    assert_eq!(stored.status, expected_status);
    assert!(stored.error.as_deref().is_some_and(|e| e.contains("29")));
    assert_eq!(harness.sleeper.recorded().len(), 2);
}

#[tokio::test]
async fn access_errors_fail_without_retrying() {
    let task = task_for(TaskType::FetchComments, json!({ "group_id": GROUP_ID }));
    let vk = ScriptedVkSource::default()
        .with_posts(Err(VkSourceError::api(15_i64, "Access denied")));
    let harness = Harness::new(&task, vk);

    let error = harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect_err("access denied");

    assert!(!error.retryable);
    assert!(harness.sleeper.recorded().is_empty());
    assert_eq!(harness.stored(&task).status, TaskStatus::Failed);
}

#[tokio::test]
async fn terminal_tasks_are_skipped() {
    let mut task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    task.start(fixture_timestamp()).expect("start");
    task.complete(json!({ "comments_analyzed": 0 }), fixture_timestamp())
        .expect("complete");
    let harness = Harness::new(&task, ScriptedVkSource::default());

    harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect("acknowledged");
    assert_eq!(harness.stored(&task), task);
}

#[tokio::test]
async fn redelivered_processing_task_runs_again() {
    let mut task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    task.start(fixture_timestamp()).expect("start");
    let harness = Harness::new(&task, ScriptedVkSource::default());

    harness
        .processor()
        .handle(&job_for(&task, 1))
        .await
        .expect("re-pickup succeeds");
    let stored = harness.stored(&task);
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.started_at, task.started_at);
}

#[tokio::test]
async fn missing_task_buries_the_job() {
    let task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    let harness = Harness::new(&task, ScriptedVkSource::default());
    let orphan = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));

    let error = harness
        .processor()
        .handle(&job_for(&orphan, 0))
        .await
        .expect_err("task missing");
    assert!(!error.retryable);
}

#[tokio::test]
async fn malformed_payload_buries_the_job() {
    let task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    let harness = Harness::new(&task, ScriptedVkSource::default());
    let mut job = job_for(&task, 0);
    job.data = json!({ "unexpected": true });

    let error = harness
        .processor()
        .handle(&job)
        .await
        .expect_err("bad payload");
    assert!(!error.retryable);
    assert_eq!(harness.stored(&task).status, TaskStatus::Pending);
}

#[tokio::test]
async fn invalid_stored_parameters_fail_the_task() {
    let mut task = task_for(TaskType::ProcessGroups, json!({ "group_ids": [Uuid::new_v4()] }));
    task.parameters = json!({ "group_ids": [] });
    let harness = Harness::new(&task, ScriptedVkSource::default());

    let error = harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect_err("invalid parameters");
    assert!(!error.retryable);
    assert_eq!(harness.stored(&task).status, TaskStatus::Failed);
}

#[tokio::test]
async fn process_groups_classifies_every_pending_group() {
    let existing = group("existing", Some(7), GroupStatus::Valid);
    let fresh = group("fresh", None, GroupStatus::Pending);
    let again = group("club7", Some(7), GroupStatus::Pending);
    let banned = group("banned", None, GroupStatus::Pending);
    let missing = group("missing", None, GroupStatus::Pending);
    let ids: Vec<Uuid> = [&fresh, &again, &banned, &missing]
        .iter()
        .map(|g| g.id)
        .collect();
    let task = task_for(TaskType::ProcessGroups, json!({ "group_ids": ids }));
    let vk = ScriptedVkSource::default().with_groups(Ok(vec![
        VkGroup {
            id: 11,
            screen_name: "fresh".to_owned(),
            name: "Fresh".to_owned(),
            deactivated: None,
        },
        VkGroup {
            id: 7,
            screen_name: "existing".to_owned(),
            name: "Existing".to_owned(),
            deactivated: None,
        },
        VkGroup {
            id: 12,
            screen_name: "banned".to_owned(),
            name: "Banned".to_owned(),
            deactivated: Some("banned".to_owned()),
        },
    ]));
    let harness = Harness::new(&task, vk).with_groups(vec![
        existing,
        fresh.clone(),
        again.clone(),
        banned.clone(),
        missing.clone(),
    ]);

    harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect("validation succeeds");

    assert_eq!(
        harness.stored(&task).result,
        Some(json!({ "groups_total": 4, "valid": 1, "invalid": 2, "duplicate": 1 }))
    );
    assert_eq!(
        harness.vk.requested_group_keys(),
        vec![vec![
            "fresh".to_owned(),
            "7".to_owned(),
            "banned".to_owned(),
            "missing".to_owned()
        ]]
    );
    let status_of = |id: Uuid| {
        harness
            .groups
            .all()
            .into_iter()
            .find(|g| g.id == id)
            .map(|g| g.status)
    };
    assert_eq!(status_of(fresh.id), Some(GroupStatus::Valid));
    assert_eq!(status_of(again.id), Some(GroupStatus::Duplicate));
    assert_eq!(status_of(banned.id), Some(GroupStatus::Invalid));
    assert_eq!(status_of(missing.id), Some(GroupStatus::Invalid));
}

#[tokio::test]
async fn process_groups_reports_what_the_repository_stored() {
    let pending = group("club7", Some(7), GroupStatus::Pending);
    let task = task_for(TaskType::ProcessGroups, json!({ "group_ids": [pending.id] }));
    let vk = ScriptedVkSource::default().with_groups(Ok(vec![VkGroup {
        id: 7,
        screen_name: "club7".to_owned(),
        name: "Seven".to_owned(),
        deactivated: None,
    }]));
    let harness = Harness::new(&task, vk);

    // Another job claims community 7 between the lookup and the write.
    let mut groups = MockGroupRepository::new();
    let listed = pending.clone();
    groups
        .expect_find_by_ids()
        .returning(move |_| Ok(vec![listed.clone()]));
    groups
        .expect_find_valid_matching()
        .returning(|_, _| Ok(Vec::new()));
    groups
        .expect_apply_resolutions()
        .times(1)
        .withf(|resolutions, _| {
            resolutions
                .iter()
                .all(|resolution| resolution.status == GroupStatus::Valid)
        })
        .returning(|resolutions, _| {
            Ok(resolutions
                .iter()
                .cloned()
                .map(|resolution| resolution.into_duplicate())
                .collect())
        });

    harness
        .processor_with_groups(Arc::new(groups))
        .handle(&job_for(&task, 0))
        .await
        .expect("validation succeeds");

    assert_eq!(
        harness.stored(&task).result,
        Some(json!({ "groups_total": 1, "valid": 0, "invalid": 0, "duplicate": 1 }))
    );
}

#[tokio::test]
async fn in_memory_groups_keep_one_valid_row_per_community() {
    let holder = group("club7", Some(7), GroupStatus::Valid);
    let late = group("seven", None, GroupStatus::Pending);
    let repo = InMemoryGroupRepository::with_groups(vec![holder, late.clone()]);

    let stored = repo
        .apply_resolutions(
            &[GroupResolution {
                group_id: late.id,
                status: GroupStatus::Valid,
                vk_group_id: Some(7),
                name: Some("Seven".to_owned()),
                status_reason: None,
            }],
            fixture_timestamp(),
        )
        .await
        .expect("resolutions stored");

    assert_eq!(stored[0].status, GroupStatus::Duplicate);
    assert_eq!(
        stored[0].status_reason.as_deref(),
        Some(ALREADY_MONITORED_REASON)
    );
    let row = repo
        .all()
        .into_iter()
        .find(|g| g.id == late.id)
        .expect("row kept");
    assert_eq!(row.status, GroupStatus::Duplicate);
}

#[tokio::test]
async fn analyze_posts_marks_comments_and_bumps_counters() {
    let task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    let author = UserId::random();
    let comments = InMemoryCommentRepository::with_comments(vec![
        user_comment(author, "this is a promo"),
        user_comment(author, "nothing to see"),
    ]);
    let harness = Harness::new(&task, ScriptedVkSource::default()).with_comments(comments);

    harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect("analysis succeeds");

    assert_eq!(
        harness.stored(&task).result,
        Some(json!({ "comments_analyzed": 2, "keyword_matches": 1 }))
    );
    let stored = harness.comments.all();
    assert!(stored.iter().all(|c| c.analyzed));
    assert!(
        stored
            .iter()
            .any(|c| c.matched_keywords == vec!["promo".to_owned()])
    );
    assert_eq!(harness.keywords.all()[0].match_count, 1);
}

#[tokio::test]
async fn analyze_posts_retry_counts_only_what_the_failed_run_left() {
    let task = task_for(TaskType::AnalyzePosts, json!({ "limit": 10 }));
    let author = UserId::random();
    let comments = InMemoryCommentRepository::with_comments(vec![
        user_comment(author, "first promo"),
        user_comment(author, "second promo"),
    ]);
    let harness = Harness::new(&task, ScriptedVkSource::default()).with_comments(comments);
    harness.comments.fail_write_after(1);

    let error = harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect_err("storage outage");
    assert!(error.retryable);
    assert_eq!(harness.stored(&task).status, TaskStatus::Processing);
    assert_eq!(harness.keywords.all()[0].match_count, 1);

    harness
        .processor()
        .handle(&job_for(&task, 1))
        .await
        .expect("retry succeeds");

    assert_eq!(
        harness.stored(&task).result,
        Some(json!({ "comments_analyzed": 1, "keyword_matches": 1 }))
    );
    assert!(harness.comments.all().iter().all(|c| c.analyzed));
    assert_eq!(harness.keywords.all()[0].match_count, 2);
}

#[tokio::test]
async fn fetch_comments_retry_counts_each_stored_comment_once() {
    let task = task_for(
        TaskType::FetchComments,
        json!({ "group_id": GROUP_ID, "posts_limit": 2 }),
    );
    let script = || {
        ScriptedVkSource::default()
            .with_posts(Ok(page(2, vec![post(1, 1), post(2, 1)])))
            .with_comments(Ok(page(1, vec![comment(1, "promo one")])))
            .with_comments(Ok(page(1, vec![comment(2, "promo two")])))
    };
    let harness = Harness::new(&task, script());
    harness.comments.fail_write_after(1);

    let error = harness
        .processor()
        .handle(&job_for(&task, 0))
        .await
        .expect_err("storage outage");
    assert!(error.retryable);
    assert_eq!(harness.comments.all().len(), 1);
    assert_eq!(harness.keywords.all()[0].match_count, 1);

    let retry = Harness {
        vk: Arc::new(script()),
        ..harness
    };
    retry
        .processor()
        .handle(&job_for(&task, 1))
        .await
        .expect("retry succeeds");

    let result = retry.stored(&task).result.expect("result");
    assert_eq!(result["comments_inserted"], 1);
    assert_eq!(result["duplicates_skipped"], 1);
    assert_eq!(result["keyword_matches"], 1);
    assert_eq!(retry.comments.all().len(), 2);
    assert_eq!(retry.keywords.all()[0].match_count, 2);
}
