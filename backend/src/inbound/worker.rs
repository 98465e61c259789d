//! Queue worker loop.
//!
//! A [`Worker`] runs `concurrency` Tokio tasks. Each one reserves a job from
//! the configured queues, hands it to the [`JobHandler`] under a fresh trace
//! id and settles it: acknowledged on success, rescheduled with exponential
//! backoff for retryable failures with attempts left, buried otherwise.
//! While the handler runs the job's lease is extended every
//! `lease_renewal`. A settlement refused because the lease was lost means
//! another delivery owns the job now; it is logged and dropped.
//! Tasks stop between jobs once the shutdown channel flips to `true`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::domain::ports::{JobHandler, JobQueueError, JobSource};
use crate::domain::{JobEnvelope, JobError, QueueName, TraceId};

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Number of concurrent job loops.
    pub concurrency: usize,
    /// Sleep between polls when every queue is empty.
    pub poll_interval: Duration,
    /// Queues to consume, highest precedence first.
    pub queues: Vec<QueueName>,
    /// Interval between lease extensions while a handler runs.
    pub lease_renewal: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            queues: QueueName::ALL.to_vec(),
            lease_renewal: Duration::from_secs(60),
        }
    }
}

fn tolerate_lost_lease(settled: Result<(), JobQueueError>) -> Result<(), JobQueueError> {
    match settled {
        Err(JobQueueError::LeaseLost { message }) => {
            warn!(%message, "job lease lost before settlement");
            Ok(())
        }
        other => other,
    }
}

/// What to do with a job whose handler failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Schedule another attempt after the delay.
    Retry(Duration),
    /// Move the job to the dead-letter list.
    Bury,
}

/// Retry retryable failures while attempts remain; bury everything else.
pub fn failure_action(job: &JobEnvelope, error: &JobError) -> FailureAction {
    if error.retryable && job.has_attempts_left() {
        FailureAction::Retry(job.retry_delay())
    } else {
        FailureAction::Bury
    }
}

/// Reserve/handle/settle loop over a [`JobSource`].
#[derive(Clone)]
pub struct Worker {
    source: Arc<dyn JobSource>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker.
    pub fn new(
        source: Arc<dyn JobSource>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            handler,
            config,
        }
    }

    /// Run the loops until `shutdown` turns `true` or its sender drops.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            concurrency,
            queues = ?self.config.queues,
            "worker started"
        );

        let mut loops = JoinSet::new();
        for index in 0..concurrency {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            loops.spawn(async move { worker.poll_loop(index, shutdown).await });
        }
        while let Some(joined) = loops.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "worker loop panicked");
            }
        }
        info!("worker stopped");
    }

    async fn poll_loop(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(index, "worker loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_next().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => warn!(index, error = %err, "queue unavailable, backing off"),
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        debug!(index, "worker loop stopped");
    }

    /// Process at most one job across the configured queues.
    ///
    /// Returns `true` when a job was reserved.
    pub async fn process_next(&self) -> Result<bool, JobQueueError> {
        for queue in &self.config.queues {
            if let Some(job) = self.source.reserve(*queue).await? {
                self.process(job).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn process(&self, job: JobEnvelope) -> Result<(), JobQueueError> {
        let trace_id = TraceId::generate();
        let span = info_span!(
            "job",
            queue = %job.queue,
            job_id = %job.id,
            name = %job.name,
            attempt = job.current_attempt(),
            trace_id = %trace_id,
        );
        TraceId::scope(trace_id, self.handle_and_settle(job))
            .instrument(span)
            .await
    }

    async fn handle_and_settle(&self, job: JobEnvelope) -> Result<(), JobQueueError> {
        let err = match self.handle_with_renewal(&job).await {
            Ok(()) => {
                tolerate_lost_lease(self.source.ack(&job).await)?;
                info!("job completed");
                return Ok(());
            }
            Err(err) => err,
        };
        let settled = match failure_action(&job, &err) {
            FailureAction::Retry(delay) => {
                warn!(error = %err, delay = ?delay, "job failed, retrying");
                self.source.retry(&job, delay, &err.message).await
            }
            FailureAction::Bury => {
                error!(error = %err, retryable = err.retryable, "job failed permanently");
                self.source.bury(&job, &err.message).await
            }
        };
        tolerate_lost_lease(settled)
    }

    async fn handle_with_renewal(&self, job: &JobEnvelope) -> Result<(), JobError> {
        let handling = self.handler.handle(job);
        tokio::pin!(handling);
        let mut renewal =
            tokio::time::interval(self.config.lease_renewal.max(Duration::from_millis(1)));
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        renewal.tick().await;
        loop {
            tokio::select! {
                outcome = &mut handling => return outcome,
                _ = renewal.tick() => {
                    if let Err(err) = self.source.extend(job).await {
                        warn!(error = %err, "job lease renewal failed");
                    }
                }
            }
        }
    }
}
