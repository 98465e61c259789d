//! Queue job envelope shared by the dispatcher and the worker.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::task::TaskType;

/// Attempts per job unless overridden.
pub const DEFAULT_JOB_ATTEMPTS: u32 = 3;
/// Initial exponential backoff delay.
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;
/// Longest delay between two attempts.
pub const MAX_BACKOFF_MS: u64 = 10 * 60 * 1_000;

/// Named queues consumed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    /// VK collection and analysis jobs.
    VkCollect,
    /// Group validation jobs.
    ProcessGroups,
}

impl QueueName {
    /// Every queue.
    pub const ALL: [Self; 2] = [Self::VkCollect, Self::ProcessGroups];

    /// Redis key segment and log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VkCollect => "vk-collect",
            Self::ProcessGroups => "process-groups",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|queue| queue.as_str() == s)
            .ok_or_else(|| format!("unknown queue: {s}"))
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// 1 = most urgent.
    pub priority: u8,
    /// Total attempts including the first.
    pub attempts: u32,
    /// Base delay for exponential backoff.
    pub backoff_ms: u64,
    /// Hold the job back before its first attempt.
    pub delay: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: super::task::DEFAULT_TASK_PRIORITY,
            attempts: DEFAULT_JOB_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            delay: None,
        }
    }
}

/// Serialised job as stored in Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Random job id.
    pub id: String,
    /// Queue the job lives on.
    pub queue: QueueName,
    /// Handler name, the task type for task jobs.
    pub name: String,
    /// Handler payload.
    pub data: Value,
    /// Failed deliveries so far.
    pub attempts_made: u32,
    /// Total deliveries allowed, at least one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub backoff_ms: u64,
    /// 1 = most urgent.
    pub priority: u8,
    /// Enqueue instant in Unix milliseconds; breaks priority ties.
    pub enqueued_at_ms: i64,
    /// Message of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    /// Token of the lease held by the current delivery.
    ///
    /// Set on reservation and never stored in the job body; settling or
    /// renewing with a stale token fails with `lease_lost`.
    #[serde(skip)]
    pub lease: Option<String>,
}

impl JobEnvelope {
    /// Build a fresh envelope with a random id.
    pub fn new(
        queue: QueueName,
        name: impl Into<String>,
        data: Value,
        options: &JobOptions,
        enqueued_at_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            queue,
            name: name.into(),
            data,
            attempts_made: 0,
            max_attempts: options.attempts.max(1),
            backoff_ms: options.backoff_ms,
            priority: options.priority,
            enqueued_at_ms,
            failed_reason: None,
            lease: None,
        }
    }

    /// Copy to store after a failed delivery: one more attempt, no lease.
    pub fn after_failure(&self, reason: &str) -> Self {
        Self {
            attempts_made: self.attempts_made.saturating_add(1),
            failed_reason: Some(reason.to_owned()),
            lease: None,
            ..self.clone()
        }
    }

    /// Attempt number of the delivery currently being handled (1-based).
    pub fn current_attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    /// Whether another attempt remains after the current one.
    pub fn has_attempts_left(&self) -> bool {
        self.current_attempt() < self.max_attempts
    }

    /// Exponential backoff before the next attempt.
    ///
    /// # Examples
    /// ```
    /// use serde_json::json;
    /// use vk_monitor::domain::{JobEnvelope, JobOptions, QueueName};
    ///
    /// let mut job = JobEnvelope::new(QueueName::VkCollect, "t", json!({}), &JobOptions::default(), 0);
    /// assert_eq!(job.retry_delay().as_millis(), 1_000);
    /// job.attempts_made = 2;
    /// assert_eq!(job.retry_delay().as_millis(), 4_000);
    /// ```
    pub fn retry_delay(&self) -> Duration {
        let exponent = self.attempts_made.min(20);
        let delay = self
            .backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(MAX_BACKOFF_MS);
        Duration::from_millis(delay)
    }

    /// Decode the task reference carried in `data`.
    pub fn task_payload(&self) -> Result<TaskJobPayload, JobError> {
        serde_json::from_value(self.data.clone())
            .map_err(|err| JobError::permanent(format!("malformed job payload: {err}")))
    }
}

/// Task reference carried by every task job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskJobPayload {
    /// Task row driving the job.
    pub task_id: Uuid,
    /// Type at enqueue time.
    pub task_type: TaskType,
}

/// Failure reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    /// Human-readable reason stored on the job.
    pub message: String,
    /// Whether the queue should schedule another attempt.
    pub retryable: bool,
}

impl JobError {
    /// Error that the queue should retry with backoff.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Error that should bury the job immediately.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Queue depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue: QueueName,
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn envelope(attempts: u32) -> JobEnvelope {
        let options = JobOptions {
            attempts,
            ..JobOptions::default()
        };
        JobEnvelope::new(QueueName::VkCollect, "fetch_comments", json!({}), &options, 0)
    }

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(3, 8_000)]
    #[case(19, MAX_BACKOFF_MS)]
    fn backoff_grows_exponentially_with_cap(#[case] attempts_made: u32, #[case] expected: u64) {
        let mut job = envelope(30);
        job.attempts_made = attempts_made;
        assert_eq!(job.retry_delay(), Duration::from_millis(expected));
    }

    #[test]
    fn leases_stay_out_of_the_stored_body() {
        let mut job = envelope(3);
        job.lease = Some("lease-1".to_owned());
        let body = serde_json::to_string(&job).expect("encode");
        assert!(!body.contains("lease-1"));
        let decoded: JobEnvelope = serde_json::from_str(&body).expect("decode");
        assert_eq!(decoded.lease, None);

        let failed = job.after_failure("timeout");
        assert_eq!(failed.attempts_made, 1);
        assert_eq!(failed.failed_reason.as_deref(), Some("timeout"));
        assert_eq!(failed.lease, None);
    }

    #[test]
    fn attempts_left_counts_current_delivery() {
        let mut job = envelope(3);
        assert!(job.has_attempts_left());
        job.attempts_made = 2;
        assert!(!job.has_attempts_left());
    }

    #[test]
    fn zero_attempts_still_allow_one_delivery() {
        let job = envelope(0);
        assert_eq!(job.max_attempts, 1);
    }

    #[test]
    fn queue_names_use_kebab_case() {
        assert_eq!(
            serde_json::to_value(QueueName::ProcessGroups).expect("serialise"),
            json!("process-groups")
        );
        assert_eq!("vk-collect".parse::<QueueName>(), Ok(QueueName::VkCollect));
    }

    #[test]
    fn malformed_payload_is_permanent() {
        let job = envelope(3);
        let err = job.task_payload().expect_err("missing task id");
        assert!(!err.retryable);
    }

    #[test]
    fn decodes_task_payload_ignoring_metadata() {
        let task_id = Uuid::new_v4();
        let mut job = envelope(3);
        job.data = json!({ "task_id": task_id, "task_type": "fetch_comments", "group_id": 5 });
        let payload = job.task_payload().expect("payload");
        assert_eq!(payload.task_id, task_id);
        assert_eq!(payload.task_type, TaskType::FetchComments);
    }
}
