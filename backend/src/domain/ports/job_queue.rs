//! Ports at both ends of the job queue.
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{JobEnvelope, JobError, JobOptions, QueueName, QueueStats};

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the queue adapter.
    pub enum JobQueueError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "job queue is unavailable: {message}",
        /// The job could not be stored or decoded.
        Rejected { message: String } => "job was rejected: {message}",
        /// The delivery no longer holds the job's lease.
        LeaseLost { message: String } => "job lease was lost: {message}",
    }
}

/// Producer side of the queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job and return its id.
    async fn enqueue(
        &self,
        queue: QueueName,
        name: &str,
        data: Value,
        options: JobOptions,
    ) -> Result<String, JobQueueError>;

    /// Depth of every queue.
    async fn stats(&self) -> Result<Vec<QueueStats>, JobQueueError>;
}

/// Consumer side: business logic run for each reserved job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle one delivery. Errors decide between retry and dead-lettering.
    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError>;
}

/// Consumer side of the queue, driven by the worker loop.
///
/// A reserved job is leased to its worker. It must be settled with exactly
/// one of `ack`, `retry` or `bury`; an expired lease returns it to waiting.
/// Long handlers keep the lease alive with `extend`. Every call after
/// reservation fails with `LeaseLost` once the delivery's lease has expired,
/// so a stalled delivery can never settle a job another worker now holds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Lease the most urgent ready job of `queue`, if any.
    async fn reserve(&self, queue: QueueName) -> Result<Option<JobEnvelope>, JobQueueError>;

    /// Push the lease deadline of a running job forward.
    async fn extend(&self, job: &JobEnvelope) -> Result<(), JobQueueError>;

    /// Remove a finished job.
    async fn ack(&self, job: &JobEnvelope) -> Result<(), JobQueueError>;

    /// Count the attempt and schedule the job again after `delay`.
    async fn retry(
        &self,
        job: &JobEnvelope,
        delay: Duration,
        reason: &str,
    ) -> Result<(), JobQueueError>;

    /// Move the job to the dead-letter list.
    async fn bury(&self, job: &JobEnvelope, reason: &str) -> Result<(), JobQueueError>;
}
