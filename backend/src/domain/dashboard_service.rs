//! Dashboard statistics aggregated from every store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::ports::{
    CommentRepository, DashboardQuery, GroupRepository, JobQueue, KeywordRepository,
    TaskRepository,
};
use crate::domain::{
    DashboardStats, Error, GroupStatus, TOP_KEYWORDS, TaskStatus, status_counts,
};

/// Dashboard service implementing [`DashboardQuery`].
///
/// Database failures fail the request. Queue statistics are best effort:
/// when Redis is unreachable the dashboard still renders with no queues.
#[derive(Clone)]
pub struct DashboardService<G, C, K, T, Q> {
    groups: Arc<G>,
    comments: Arc<C>,
    keywords: Arc<K>,
    tasks: Arc<T>,
    queue: Arc<Q>,
}

impl<G, C, K, T, Q> DashboardService<G, C, K, T, Q> {
    /// Create a dashboard service over the repositories and the queue.
    pub fn new(
        groups: Arc<G>,
        comments: Arc<C>,
        keywords: Arc<K>,
        tasks: Arc<T>,
        queue: Arc<Q>,
    ) -> Self {
        Self {
            groups,
            comments,
            keywords,
            tasks,
            queue,
        }
    }
}

fn unavailable(source: &str, error: impl std::fmt::Display) -> Error {
    Error::service_unavailable(format!("{source} statistics unavailable: {error}"))
}

#[async_trait]
impl<G, C, K, T, Q> DashboardQuery for DashboardService<G, C, K, T, Q>
where
    G: GroupRepository,
    C: CommentRepository,
    K: KeywordRepository,
    T: TaskRepository,
    Q: JobQueue,
{
    async fn stats(&self) -> Result<DashboardStats, Error> {
        let (groups, comments, keywords, tasks, queues) = tokio::join!(
            self.groups.count_by_status(),
            self.comments.stats(),
            self.keywords.stats(TOP_KEYWORDS),
            self.tasks.count_by_status(),
            self.queue.stats(),
        );

        let groups = groups.map_err(|err| unavailable("group", err))?;
        let comments = comments.map_err(|err| unavailable("comment", err))?;
        let keywords = keywords.map_err(|err| unavailable("keyword", err))?;
        let tasks = tasks.map_err(|err| unavailable("task", err))?;
        let queues = queues.unwrap_or_else(|err| {
            warn!(error = %err, "queue statistics unavailable");
            Vec::new()
        });

        Ok(DashboardStats {
            groups: status_counts(
                GroupStatus::ALL.iter().map(|status| status.as_str()),
                groups
                    .into_iter()
                    .map(|(status, count)| (status.as_str().to_owned(), count)),
            ),
            comments,
            keywords,
            tasks: status_counts(
                TaskStatus::ALL.iter().map(|status| status.as_str()),
                tasks
                    .into_iter()
                    .map(|(status, count)| (status.as_str().to_owned(), count)),
            ),
            queues,
        })
    }
}
