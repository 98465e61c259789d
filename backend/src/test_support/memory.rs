//! In-memory port implementations for service and worker tests.
//!
//! Each double keeps its rows behind a `Mutex` and mirrors the adapter's
//! observable contract: uniqueness, status guards and newest-first ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ports::{
    CommentRepository, CommentRepositoryError, GroupRepository, GroupRepositoryError, JobQueue,
    JobQueueError, JobSource, KeywordRepository, KeywordRepositoryError, PostRepository,
    PostRepositoryError, RefreshTokenStore, RefreshTokenStoreError, TaskRepository,
    TaskRepositoryError, TaskStatusStore, TaskStatusStoreError, UserPersistenceError,
    UserRepository,
};
use crate::domain::{
    Comment, CommentAuthor, CommentFilter, CommentStats, Group, GroupFilter, GroupResolution,
    CommentMatches, GroupStatus, IngestedComment, JobEnvelope, JobOptions, Keyword, KeywordFilter,
    KeywordStats, Listing, Page, Post, PostFilter, PostUpsert, QueueName, QueueStats, Task,
    TaskFilter, TaskStatus, TaskStatusSnapshot, TopKeyword, UserAccount, UserId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("in-memory store mutex poisoned"),
    }
}

fn paginate<T>(rows: Vec<T>, page: &Page) -> Listing<T> {
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Listing::new(items, total)
}

/// Task rows with the status guard applied on save.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    rows: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskRepository {
    pub fn with_task(task: Task) -> Self {
        let repo = Self::default();
        lock(&repo.rows).insert(task.id, task);
        repo
    }

    pub fn insert_task(&self, task: Task) {
        lock(&self.rows).insert(task.id, task);
    }

    pub fn get(&self, id: &Uuid) -> Option<Task> {
        lock(&self.rows).get(id).cloned()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert(&self, task: &Task) -> Result<(), TaskRepositoryError> {
        lock(&self.rows).insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Task>, TaskRepositoryError> {
        Ok(self.get(id))
    }

    async fn save(&self, task: &Task) -> Result<bool, TaskRepositoryError> {
        let mut rows = lock(&self.rows);
        let Some(stored) = rows.get_mut(&task.id) else {
            return Ok(false);
        };
        if !task.status.predecessors().contains(&stored.status) {
            return Ok(false);
        }
        *stored = task.clone();
        Ok(true)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Listing<Task>, TaskRepositoryError> {
        let mut rows: Vec<Task> = lock(&self.rows)
            .values()
            .filter(|task| filter.status.is_none_or(|status| task.status == status))
            .filter(|task| filter.task_type.is_none_or(|kind| task.task_type == kind))
            .filter(|task| filter.created_by.is_none_or(|user| task.created_by == Some(user)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, &filter.page))
    }

    async fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>, TaskRepositoryError> {
        let mut counts: HashMap<TaskStatus, i64> = HashMap::new();
        for task in lock(&self.rows).values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

/// Snapshot cache backed by a map.
#[derive(Default)]
pub struct InMemoryTaskStatusStore {
    snapshots: Mutex<HashMap<Uuid, TaskStatusSnapshot>>,
}

impl InMemoryTaskStatusStore {
    pub fn snapshot(&self, task_id: &Uuid) -> Option<TaskStatusSnapshot> {
        lock(&self.snapshots).get(task_id).cloned()
    }
}

#[async_trait]
impl TaskStatusStore for InMemoryTaskStatusStore {
    async fn put(&self, snapshot: &TaskStatusSnapshot) -> Result<(), TaskStatusStoreError> {
        lock(&self.snapshots).insert(snapshot.task_id, snapshot.clone());
        Ok(())
    }

    async fn get(
        &self,
        task_id: &Uuid,
    ) -> Result<Option<TaskStatusSnapshot>, TaskStatusStoreError> {
        Ok(lock(&self.snapshots).get(task_id).cloned())
    }
}

/// Job recorded by [`RecordingJobQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedJob {
    pub id: String,
    pub queue: QueueName,
    pub name: String,
    pub data: Value,
    pub options: JobOptions,
}

/// Queue producer that records every enqueue.
#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<RecordedJob>>,
}

impl RecordingJobQueue {
    pub fn jobs(&self) -> Vec<RecordedJob> {
        lock(&self.jobs).clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        name: &str,
        data: Value,
        options: JobOptions,
    ) -> Result<String, JobQueueError> {
        let mut jobs = lock(&self.jobs);
        let id = (jobs.len() + 1).to_string();
        jobs.push(RecordedJob {
            id: id.clone(),
            queue,
            name: name.to_owned(),
            data,
            options,
        });
        Ok(id)
    }

    async fn stats(&self) -> Result<Vec<QueueStats>, JobQueueError> {
        let jobs = lock(&self.jobs);
        Ok(QueueName::ALL
            .into_iter()
            .map(|queue| QueueStats {
                queue,
                waiting: jobs.iter().filter(|job| job.queue == queue).count() as u64,
                delayed: 0,
                active: 0,
                failed: 0,
            })
            .collect())
    }
}

/// How a reserved job was settled by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Acked(String),
    Retried {
        id: String,
        delay: Duration,
        reason: String,
    },
    Buried {
        id: String,
        reason: String,
    },
}

/// Consumer double: FIFO per queue, retries go straight back to waiting.
///
/// Reservation hands out a lease token; settling or extending a job whose
/// lease was taken away fails with [`JobQueueError::LeaseLost`].
#[derive(Default)]
pub struct InMemoryJobSource {
    waiting: Mutex<HashMap<QueueName, VecDeque<JobEnvelope>>>,
    leases: Mutex<HashMap<String, String>>,
    extensions: Mutex<Vec<String>>,
    settled: Mutex<Vec<Settled>>,
}

impl InMemoryJobSource {
    pub fn push(&self, job: JobEnvelope) {
        lock(&self.waiting)
            .entry(job.queue)
            .or_default()
            .push_back(job);
    }

    pub fn settled(&self) -> Vec<Settled> {
        lock(&self.settled).clone()
    }

    pub fn waiting(&self, queue: QueueName) -> usize {
        lock(&self.waiting).get(&queue).map_or(0, VecDeque::len)
    }

    /// Ids of every successful lease extension, in order.
    pub fn extensions(&self) -> Vec<String> {
        lock(&self.extensions).clone()
    }

    /// Stall a reserved job: drop its lease and return it to waiting.
    pub fn expire_lease(&self, job: &JobEnvelope) {
        if lock(&self.leases).remove(&job.id).is_some() {
            let mut stalled = job.clone();
            stalled.lease = None;
            self.push(stalled);
        }
    }

    fn release(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        self.check_lease(job)?;
        lock(&self.leases).remove(&job.id);
        Ok(())
    }

    fn check_lease(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        let leases = lock(&self.leases);
        match (leases.get(&job.id), job.lease.as_ref()) {
            (Some(held), Some(ours)) if held == ours => Ok(()),
            _ => Err(JobQueueError::lease_lost(format!(
                "job {} is no longer leased to this delivery",
                job.id
            ))),
        }
    }
}

#[async_trait]
impl JobSource for InMemoryJobSource {
    async fn reserve(&self, queue: QueueName) -> Result<Option<JobEnvelope>, JobQueueError> {
        let popped = lock(&self.waiting)
            .get_mut(&queue)
            .and_then(VecDeque::pop_front);
        Ok(popped.map(|mut job| {
            let token = Uuid::new_v4().to_string();
            lock(&self.leases).insert(job.id.clone(), token.clone());
            job.lease = Some(token);
            job
        }))
    }

    async fn extend(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        self.check_lease(job)?;
        lock(&self.extensions).push(job.id.clone());
        Ok(())
    }

    async fn ack(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        self.release(job)?;
        lock(&self.settled).push(Settled::Acked(job.id.clone()));
        Ok(())
    }

    async fn retry(
        &self,
        job: &JobEnvelope,
        delay: Duration,
        reason: &str,
    ) -> Result<(), JobQueueError> {
        self.release(job)?;
        lock(&self.settled).push(Settled::Retried {
            id: job.id.clone(),
            delay,
            reason: reason.to_owned(),
        });
        self.push(job.after_failure(reason));
        Ok(())
    }

    async fn bury(&self, job: &JobEnvelope, reason: &str) -> Result<(), JobQueueError> {
        self.release(job)?;
        lock(&self.settled).push(Settled::Buried {
            id: job.id.clone(),
            reason: reason.to_owned(),
        });
        Ok(())
    }
}

/// Comments keyed by id, deduplicated on VK coordinates.
///
/// When linked to a keyword double with [`Self::counting_into`], stored
/// matches bump its counters under the same lock, like the adapter's
/// transaction.
#[derive(Default)]
pub struct InMemoryCommentRepository {
    rows: Mutex<Vec<Comment>>,
    counters: Option<Arc<InMemoryKeywordRepository>>,
    failing_write: Mutex<Option<usize>>,
}

impl InMemoryCommentRepository {
    pub fn with_comments(comments: Vec<Comment>) -> Self {
        Self {
            rows: Mutex::new(comments),
            ..Self::default()
        }
    }

    pub fn counting_into(mut self, keywords: Arc<InMemoryKeywordRepository>) -> Self {
        self.counters = Some(keywords);
        self
    }

    /// Let `successes` writes through, then fail the next one with a
    /// connection error. Later writes succeed again.
    pub fn fail_write_after(&self, successes: usize) {
        *lock(&self.failing_write) = Some(successes);
    }

    pub fn all(&self) -> Vec<Comment> {
        lock(&self.rows).clone()
    }

    fn check_write(&self) -> Result<(), CommentRepositoryError> {
        let mut failing = lock(&self.failing_write);
        match *failing {
            Some(0) => {
                *failing = None;
                Err(CommentRepositoryError::connection("injected write failure"))
            }
            Some(remaining) => {
                *failing = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn count_matches(&self, matches: &CommentMatches) {
        if let Some(keywords) = &self.counters {
            keywords.bump(&matches.keyword_ids);
        }
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn insert(&self, comment: &Comment) -> Result<(), CommentRepositoryError> {
        lock(&self.rows).push(comment.clone());
        Ok(())
    }

    async fn insert_ingested(
        &self,
        comments: &[IngestedComment],
    ) -> Result<Vec<i64>, CommentRepositoryError> {
        self.check_write()?;
        let mut rows = lock(&self.rows);
        let mut inserted = Vec::new();
        for ingested in comments {
            if rows.iter().any(|row| row.vk == Some(ingested.vk)) {
                continue;
            }
            let published = ingested.published_at.unwrap_or_else(Utc::now);
            rows.push(Comment {
                id: ingested.id,
                text: ingested.text.clone(),
                author: CommentAuthor::Vk(ingested.vk_author_id),
                post_id: Some(ingested.post_id),
                vk: Some(ingested.vk),
                analyzed: true,
                matched_keywords: ingested.matches.words.clone(),
                published_at: ingested.published_at,
                created_at: published,
                updated_at: published,
            });
            self.count_matches(&ingested.matches);
            inserted.push(ingested.vk.comment_id);
        }
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Comment>, CommentRepositoryError> {
        Ok(lock(&self.rows).iter().find(|row| row.id == *id).cloned())
    }

    async fn update(&self, comment: &Comment) -> Result<(), CommentRepositoryError> {
        let mut rows = lock(&self.rows);
        if let Some(row) = rows.iter_mut().find(|row| row.id == comment.id) {
            *row = comment.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, CommentRepositoryError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|row| row.id != *id);
        Ok(rows.len() != before)
    }

    async fn list(
        &self,
        filter: &CommentFilter,
    ) -> Result<Listing<Comment>, CommentRepositoryError> {
        let search = filter.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<Comment> = lock(&self.rows)
            .iter()
            .filter(|row| {
                filter
                    .author_id
                    .is_none_or(|user| row.author == CommentAuthor::User(user))
            })
            .filter(|row| filter.post_id.is_none_or(|post| row.post_id == Some(post)))
            .filter(|row| filter.analyzed.is_none_or(|analyzed| row.analyzed == analyzed))
            .filter(|row| {
                filter
                    .has_matches
                    .is_none_or(|has| row.matched_keywords.is_empty() != has)
            })
            .filter(|row| {
                search
                    .as_deref()
                    .is_none_or(|needle| row.text.as_str().to_lowercase().contains(needle))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, &filter.page))
    }

    async fn list_unanalyzed(
        &self,
        post_ids: &[Uuid],
        limit: u32,
    ) -> Result<Vec<Comment>, CommentRepositoryError> {
        let mut rows: Vec<Comment> = lock(&self.rows)
            .iter()
            .filter(|row| !row.analyzed)
            .filter(|row| {
                post_ids.is_empty() || row.post_id.is_some_and(|post| post_ids.contains(&post))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn save_analysis(
        &self,
        id: &Uuid,
        matches: &CommentMatches,
        analyzed_at: DateTime<Utc>,
    ) -> Result<bool, CommentRepositoryError> {
        self.check_write()?;
        let mut rows = lock(&self.rows);
        let Some(row) = rows.iter_mut().find(|row| row.id == *id && !row.analyzed) else {
            return Ok(false);
        };
        row.mark_analyzed(matches.words.clone(), analyzed_at);
        self.count_matches(matches);
        Ok(true)
    }

    async fn stats(&self) -> Result<CommentStats, CommentRepositoryError> {
        let rows = lock(&self.rows);
        let count = |predicate: &dyn Fn(&Comment) -> bool| {
            i64::try_from(rows.iter().filter(|row| predicate(row)).count()).unwrap_or(i64::MAX)
        };
        Ok(CommentStats {
            total: count(&|_| true),
            analyzed: count(&|row| row.analyzed),
            with_matches: count(&|row| !row.matched_keywords.is_empty()),
        })
    }
}

/// Keywords unique on `(word, category)`.
#[derive(Default)]
pub struct InMemoryKeywordRepository {
    rows: Mutex<Vec<Keyword>>,
}

impl InMemoryKeywordRepository {
    pub fn with_keywords(keywords: Vec<Keyword>) -> Self {
        Self {
            rows: Mutex::new(keywords),
        }
    }

    pub fn all(&self) -> Vec<Keyword> {
        lock(&self.rows).clone()
    }

    fn bump(&self, keyword_ids: &[Uuid]) {
        let mut rows = lock(&self.rows);
        for row in rows.iter_mut().filter(|row| keyword_ids.contains(&row.id)) {
            row.match_count += 1;
        }
    }
}

fn same_keyword(a: &Keyword, b: &Keyword) -> bool {
    a.category == b.category && a.word == b.word
}

#[async_trait]
impl KeywordRepository for InMemoryKeywordRepository {
    async fn insert(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError> {
        let mut rows = lock(&self.rows);
        if rows.iter().any(|row| same_keyword(row, keyword)) {
            return Err(KeywordRepositoryError::conflict(keyword.word.as_str()));
        }
        rows.push(keyword.clone());
        Ok(())
    }

    async fn insert_many(&self, keywords: &[Keyword]) -> Result<usize, KeywordRepositoryError> {
        let mut rows = lock(&self.rows);
        let mut inserted = 0;
        for keyword in keywords {
            if rows.iter().any(|row| same_keyword(row, keyword)) {
                continue;
            }
            rows.push(keyword.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Keyword>, KeywordRepositoryError> {
        Ok(lock(&self.rows).iter().find(|row| row.id == *id).cloned())
    }

    async fn update(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError> {
        let mut rows = lock(&self.rows);
        if rows
            .iter()
            .any(|row| row.id != keyword.id && same_keyword(row, keyword))
        {
            return Err(KeywordRepositoryError::conflict(keyword.word.as_str()));
        }
        if let Some(row) = rows.iter_mut().find(|row| row.id == keyword.id) {
            *row = keyword.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, KeywordRepositoryError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|row| row.id != *id);
        Ok(rows.len() != before)
    }

    async fn list(
        &self,
        filter: &KeywordFilter,
    ) -> Result<Listing<Keyword>, KeywordRepositoryError> {
        let search = filter.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<Keyword> = lock(&self.rows)
            .iter()
            .filter(|row| filter.category.as_ref().is_none_or(|c| &row.category == c))
            .filter(|row| filter.is_active.is_none_or(|active| row.is_active == active))
            .filter(|row| {
                search
                    .as_deref()
                    .is_none_or(|needle| row.word.as_str().to_lowercase().contains(needle))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.word.as_str().cmp(b.word.as_str()));
        Ok(paginate(rows, &filter.page))
    }

    async fn list_active(&self) -> Result<Vec<Keyword>, KeywordRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| row.is_active)
            .cloned()
            .collect())
    }

    async fn stats(&self, top: usize) -> Result<KeywordStats, KeywordRepositoryError> {
        let rows = lock(&self.rows);
        let mut ranked: Vec<&Keyword> = rows.iter().collect();
        ranked.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        Ok(KeywordStats {
            total: i64::try_from(rows.len()).unwrap_or(i64::MAX),
            active: i64::try_from(rows.iter().filter(|row| row.is_active).count())
                .unwrap_or(i64::MAX),
            top: ranked
                .into_iter()
                .take(top)
                .map(|row| TopKeyword {
                    id: row.id,
                    word: row.word.as_str().to_owned(),
                    category: row.category.as_str().to_owned(),
                    match_count: row.match_count,
                })
                .collect(),
        })
    }
}

/// Uploaded groups.
#[derive(Default)]
pub struct InMemoryGroupRepository {
    rows: Mutex<Vec<Group>>,
}

impl InMemoryGroupRepository {
    pub fn with_groups(groups: Vec<Group>) -> Self {
        Self {
            rows: Mutex::new(groups),
        }
    }

    pub fn all(&self) -> Vec<Group> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn insert_many(&self, groups: &[Group]) -> Result<(), GroupRepositoryError> {
        lock(&self.rows).extend_from_slice(groups);
        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Group>, GroupRepositoryError> {
        Ok(lock(&self.rows).iter().find(|row| row.id == *id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Group>, GroupRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| ids.contains(&row.id))
            .cloned()
            .collect())
    }

    async fn find_valid_matching(
        &self,
        screen_names: &[String],
        vk_group_ids: &[i64],
    ) -> Result<Vec<Group>, GroupRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| row.status == GroupStatus::Valid)
            .filter(|row| {
                screen_names.contains(&row.screen_name)
                    || row.vk_group_id.is_some_and(|id| vk_group_ids.contains(&id))
            })
            .cloned()
            .collect())
    }

    async fn apply_resolutions(
        &self,
        resolutions: &[GroupResolution],
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<GroupResolution>, GroupRepositoryError> {
        let mut rows = lock(&self.rows);
        let mut stored = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            let mut resolution = resolution.clone();
            if let Some(vk_id) = resolution.claims_community() {
                let held = rows.iter().any(|row| {
                    row.id != resolution.group_id
                        && row.status == GroupStatus::Valid
                        && row.vk_group_id == Some(vk_id)
                });
                if held {
                    resolution = resolution.into_duplicate();
                }
            }
            if let Some(row) = rows.iter_mut().find(|row| row.id == resolution.group_id) {
                row.status = resolution.status;
                row.vk_group_id = resolution.vk_group_id;
                row.name.clone_from(&resolution.name);
                row.status_reason.clone_from(&resolution.status_reason);
                row.updated_at = updated_at;
            }
            stored.push(resolution);
        }
        Ok(stored)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, GroupRepositoryError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|row| row.id != *id);
        Ok(rows.len() != before)
    }

    async fn list(&self, filter: &GroupFilter) -> Result<Listing<Group>, GroupRepositoryError> {
        let mut rows: Vec<Group> = lock(&self.rows)
            .iter()
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .filter(|row| {
                filter
                    .upload_task_id
                    .is_none_or(|task| row.upload_task_id == Some(task))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, &filter.page))
    }

    async fn count_by_status(&self) -> Result<Vec<(GroupStatus, i64)>, GroupRepositoryError> {
        let mut counts: HashMap<GroupStatus, i64> = HashMap::new();
        for group in lock(&self.rows).iter() {
            *counts.entry(group.status).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

/// Posts upserted on `(owner_id, vk_post_id)`.
#[derive(Default)]
pub struct InMemoryPostRepository {
    rows: Mutex<Vec<Post>>,
}

impl InMemoryPostRepository {
    pub fn all(&self) -> Vec<Post> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn upsert(&self, post: &PostUpsert) -> Result<Uuid, PostRepositoryError> {
        let mut rows = lock(&self.rows);
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.owner_id == post.owner_id && row.vk_post_id == post.vk_post_id)
        {
            row.text.clone_from(&post.text);
            row.comments_count = post.comments_count;
            row.group_id = post.group_id.or(row.group_id);
            return Ok(row.id);
        }
        let id = Uuid::new_v4();
        rows.push(Post {
            id,
            owner_id: post.owner_id,
            vk_post_id: post.vk_post_id,
            group_id: post.group_id,
            text: post.text.clone(),
            comments_count: post.comments_count,
            published_at: post.published_at,
            created_at: post.published_at.unwrap_or_else(Utc::now),
        });
        Ok(id)
    }

    async fn list(&self, filter: &PostFilter) -> Result<Listing<Post>, PostRepositoryError> {
        let mut rows: Vec<Post> = lock(&self.rows)
            .iter()
            .filter(|row| filter.group_id.is_none_or(|group| row.group_id == Some(group)))
            .filter(|row| filter.owner_id.is_none_or(|owner| row.owner_id == owner))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(paginate(rows, &filter.page))
    }
}

/// Accounts with username and email uniqueness.
#[derive(Default)]
pub struct InMemoryUserRepository {
    rows: Mutex<Vec<UserAccount>>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, account: &UserAccount) -> Result<(), UserPersistenceError> {
        let mut rows = lock(&self.rows);
        let taken = rows.iter().any(|row| {
            row.user.username() == account.user.username()
                || row.user.email() == account.user.email()
        });
        if taken {
            return Err(UserPersistenceError::conflict(account.user.username().as_str()));
        }
        rows.push(account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, UserPersistenceError> {
        Ok(lock(&self.rows)
            .iter()
            .find(|row| row.user.id() == *id)
            .cloned())
    }

    async fn find_by_login(
        &self,
        login: &str,
    ) -> Result<Option<UserAccount>, UserPersistenceError> {
        let login = login.trim();
        let email = login.to_lowercase();
        Ok(lock(&self.rows)
            .iter()
            .find(|row| {
                row.user.username().as_str() == login || row.user.email().as_str() == email
            })
            .cloned())
    }

    async fn update_password(
        &self,
        id: &UserId,
        password_hash: &str,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), UserPersistenceError> {
        if let Some(row) = lock(&self.rows).iter_mut().find(|row| row.user.id() == *id) {
            password_hash.clone_into(&mut row.password_hash);
        }
        Ok(())
    }
}

/// Refresh fingerprints keyed by user; TTLs are recorded, never enforced.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    fingerprints: Mutex<HashMap<UserId, String>>,
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        _ttl: Duration,
    ) -> Result<(), RefreshTokenStoreError> {
        lock(&self.fingerprints).insert(*user_id, fingerprint.to_owned());
        Ok(())
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RefreshTokenStoreError> {
        Ok(lock(&self.fingerprints).get(user_id).cloned())
    }

    async fn revoke(&self, user_id: &UserId) -> Result<(), RefreshTokenStoreError> {
        lock(&self.fingerprints).remove(user_id);
        Ok(())
    }
}
