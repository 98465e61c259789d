//! Worker-side execution of queued tasks.
//!
//! [`TaskProcessor`] is the [`JobHandler`] run by the queue worker. For each
//! delivery it loads the task row, moves it through the status state
//! machine, runs the type-specific executor and records the outcome. VK
//! calls are retried in place with jittered exponential backoff; whatever
//! still fails is classified so the queue either reschedules the job or
//! buries it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    CommentRepository, GroupRepository, JobHandler, KeywordRepository, PostRepository,
    TaskRepository, TaskRepositoryError, TaskStatusStore, VkSource, VkSourceError,
};
use crate::domain::task_service::cache_snapshot;
use crate::domain::{
    JobEnvelope, JobError, KeywordMatcher, Task, TaskParameters, TaskTransitionError,
};

mod analyze;
mod collect;
mod execution_error;
mod groups;
mod runtime;

use execution_error::ExecutionError;
pub use runtime::{AttemptJitter, TaskProcessorPorts, TaskProcessorRuntime, TokioSleeper};

/// Retry settings for VK calls made while executing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProcessorConfig {
    /// Maximum attempts per VK call (including the first).
    pub vk_max_attempts: u32,
    /// Initial retry backoff.
    pub initial_backoff: Duration,
    /// Maximum retry backoff cap.
    pub max_backoff: Duration,
}

impl Default for TaskProcessorConfig {
    fn default() -> Self {
        Self {
            vk_max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Async sleeping abstraction for retries.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// use vk_monitor::domain::task_processor::BackoffJitter;
    ///
    /// struct Fixed;
    /// impl BackoffJitter for Fixed {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt))
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("valid time");
    /// assert_eq!(Fixed.jittered_delay(Duration::from_millis(100), 2, now), Duration::from_millis(102));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Job handler executing fetch, validation and analysis tasks.
pub struct TaskProcessor {
    tasks: Arc<dyn TaskRepository>,
    status_store: Arc<dyn TaskStatusStore>,
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    keywords: Arc<dyn KeywordRepository>,
    groups: Arc<dyn GroupRepository>,
    vk: Arc<dyn VkSource>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: TaskProcessorConfig,
}

impl TaskProcessor {
    /// Build a processor using the tokio sleeper and default jitter.
    pub fn new(
        ports: TaskProcessorPorts,
        clock: Arc<dyn Clock>,
        config: TaskProcessorConfig,
    ) -> Self {
        Self::with_runtime(ports, clock, TaskProcessorRuntime::default(), config)
    }

    /// Build a processor with injected runtime abstractions.
    pub fn with_runtime(
        ports: TaskProcessorPorts,
        clock: Arc<dyn Clock>,
        runtime: TaskProcessorRuntime,
        config: TaskProcessorConfig,
    ) -> Self {
        Self {
            tasks: ports.tasks,
            status_store: ports.status_store,
            comments: ports.comments,
            posts: ports.posts,
            keywords: ports.keywords,
            groups: ports.groups,
            vk: ports.vk,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
        }
    }

    async fn load_task(&self, task_id: Uuid) -> Result<Task, JobError> {
        self.tasks
            .find_by_id(&task_id)
            .await
            .map_err(map_task_error)?
            .ok_or_else(|| JobError::permanent(format!("task {task_id} no longer exists")))
    }

    /// Save through the status guard and mirror the snapshot.
    async fn persist(&self, task: &Task) -> Result<bool, JobError> {
        let saved = self.tasks.save(task).await.map_err(map_task_error)?;
        if saved {
            cache_snapshot(self.status_store.as_ref(), task).await;
        }
        Ok(saved)
    }

    async fn execute(
        &self,
        parameters: &TaskParameters,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Value, ExecutionError> {
        match parameters {
            TaskParameters::FetchComments(params) => self.fetch_comments(params, progress).await,
            TaskParameters::ProcessGroups(params) => self.process_groups(params, progress).await,
            TaskParameters::AnalyzePosts(params) => self.analyze_posts(params, progress).await,
        }
    }

    async fn finish(
        &self,
        task: &mut Task,
        outcome: Result<Value, ExecutionError>,
        job: &JobEnvelope,
    ) -> Result<(), JobError> {
        let now = self.clock.utc();
        let decision = match outcome {
            Ok(result) => {
                task.complete(result, now)
                    .map_err(map_transition_error)?;
                Ok(())
            }
            Err(error) if error.is_retryable() && job.has_attempts_left() => {
                let message = error.message();
                task.note_retry(message.clone(), now);
                Err(JobError::retryable(message))
            }
            Err(error) => {
                let message = error.message();
                task.fail(message.clone(), now)
                    .map_err(map_transition_error)?;
                Err(JobError::permanent(message))
            }
        };

        if !self.persist(task).await? {
            warn!(task_id = %task.id, status = task.status.as_str(), "task changed while running; outcome not stored");
        }
        match &decision {
            Ok(()) => info!(task_id = %task.id, task_type = task.task_type.as_str(), "task completed"),
            Err(error) => warn!(
                task_id = %task.id,
                retryable = error.retryable,
                error = %error,
                status = task.status.as_str(),
                "task attempt failed"
            ),
        }
        decision
    }

    async fn fail_invalid(&self, task: &mut Task, message: String) -> Result<(), JobError> {
        let now = self.clock.utc();
        task.start(now).map_err(map_transition_error)?;
        if self.persist(task).await? {
            task.fail(message.clone(), now)
                .map_err(map_transition_error)?;
            self.persist(task).await?;
        }
        Err(JobError::permanent(message))
    }

    /// Run a VK call, retrying retryable failures with jittered backoff.
    async fn vk_call<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, VkSourceError>> + Send,
        T: Send,
    {
        let max_attempts = self.config.vk_max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let base_delay = self.retry_base_delay(attempt);
                    let delay = self
                        .jitter
                        .jittered_delay(base_delay, attempt, self.clock.utc());
                    warn!(operation, attempt, delay = ?delay, error = %error, "retrying VK call");
                    self.sleeper.sleep(delay).await;
                }
                Err(error) => return Err(ExecutionError::Vk(error)),
            }
        }

        Err(ExecutionError::Internal(
            "VK retry loop ended without an outcome".to_owned(),
        ))
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let multiplier = 1_u32 << exponent;
        self.config
            .initial_backoff
            .saturating_mul(multiplier)
            .min(self.config.max_backoff)
    }

    async fn active_matcher(&self) -> Result<KeywordMatcher, ExecutionError> {
        let keywords = self.keywords.list_active().await?;
        Ok(KeywordMatcher::new(&keywords))
    }
}

#[async_trait]
impl JobHandler for TaskProcessor {
    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        let payload = job.task_payload()?;
        let mut task = self.load_task(payload.task_id).await?;
        if task.status.is_terminal() {
            info!(task_id = %task.id, status = task.status.as_str(), job_id = %job.id, "task already finished; skipping job");
            return Ok(());
        }

        let parameters = match task.typed_parameters() {
            Ok(parameters) => parameters,
            Err(error) => {
                return self
                    .fail_invalid(&mut task, format!("invalid task parameters: {error}"))
                    .await;
            }
        };

        let first_pickup = task
            .start(self.clock.utc())
            .map_err(map_transition_error)?;
        if !self.persist(&task).await? {
            info!(task_id = %task.id, "task claimed elsewhere; skipping job");
            return Ok(());
        }
        info!(
            task_id = %task.id,
            task_type = task.task_type.as_str(),
            attempt = job.current_attempt(),
            first_pickup,
            "task started"
        );

        let outcome = {
            let mut progress = ProgressReporter {
                task: &mut task,
                tasks: self.tasks.as_ref(),
                status_store: self.status_store.as_ref(),
                clock: self.clock.as_ref(),
            };
            self.execute(&parameters, &mut progress).await
        };
        self.finish(&mut task, outcome, job).await
    }
}

fn map_transition_error(error: TaskTransitionError) -> JobError {
    JobError::permanent(error.to_string())
}

fn map_task_error(error: TaskRepositoryError) -> JobError {
    match error {
        TaskRepositoryError::Connection { .. } => JobError::retryable(error.to_string()),
        TaskRepositoryError::Query { .. } => JobError::permanent(error.to_string()),
    }
}

/// Writes progress for the running task.
pub(super) struct ProgressReporter<'a> {
    task: &'a mut Task,
    tasks: &'a dyn TaskRepository,
    status_store: &'a dyn TaskStatusStore,
    clock: &'a dyn Clock,
}

impl ProgressReporter<'_> {
    /// Record `done` of `total` steps; never moves progress backwards.
    pub(super) async fn report(&mut self, done: usize, total: usize) {
        let percent = percent_of(done, total);
        if percent <= self.task.progress {
            return;
        }
        self.task.set_progress(percent, self.clock.utc());
        match self.tasks.save(self.task).await {
            Ok(true) => cache_snapshot(self.status_store, self.task).await,
            Ok(false) => warn!(task_id = %self.task.id, "progress write rejected by status guard"),
            Err(error) => warn!(task_id = %self.task.id, error = %error, "progress write failed"),
        }
    }
}

/// Completed share in whole percent; finishing is reported separately.
fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = done.min(total).saturating_mul(99) / total;
    u8::try_from(scaled).unwrap_or(99)
}

#[cfg(test)]
mod tests;
