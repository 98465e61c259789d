//! Port and runtime dependency bundles for the task processor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    CommentRepository, GroupRepository, KeywordRepository, PostRepository, TaskRepository,
    TaskStatusStore, VkSource,
};

use super::{BackoffJitter, RetrySleeper};

/// Port bundle required by the task processor.
pub struct TaskProcessorPorts {
    /// Task rows driving each job.
    pub tasks: Arc<dyn TaskRepository>,
    /// Status cache polled by clients.
    pub status_store: Arc<dyn TaskStatusStore>,
    /// Comment persistence.
    pub comments: Arc<dyn CommentRepository>,
    /// Wall post persistence.
    pub posts: Arc<dyn PostRepository>,
    /// Keyword lookups and counters.
    pub keywords: Arc<dyn KeywordRepository>,
    /// Uploaded group persistence.
    pub groups: Arc<dyn GroupRepository>,
    /// Outbound VK API adapter.
    pub vk: Arc<dyn VkSource>,
}

/// Runtime helpers used by the VK retry loop.
pub struct TaskProcessorRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn RetrySleeper>,
    /// Jitter strategy for retry delays.
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for TaskProcessorRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(AttemptJitter),
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Default deterministic jitter strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()) ^ u64::from(attempt);
        let extra = seed % (max_extra.saturating_add(1));
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}
