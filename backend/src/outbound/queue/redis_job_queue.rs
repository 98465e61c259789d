//! Redis-backed job queue.
//!
//! Each queue owns four structures under `{prefix}:queue:{name}`:
//!
//! - `:job:{id}`: hash holding the JSON `body`, the wait `score` and the
//!   `lease` token of the delivery that holds it;
//! - `:wait`: sorted set of ready jobs, lowest score first;
//! - `:delayed`: sorted set of jobs keyed by their ready-at instant;
//! - `:active`: sorted set of leased jobs keyed by lease deadline;
//! - `:failed`: dead-letter list, newest first.
//!
//! Reservation runs as one Lua script so promotion of delayed and stalled
//! jobs and the pop itself are atomic. Lease renewal and settlement are Lua
//! scripts too: each first checks that the caller's token still owns the
//! lease, so a delivery that stalled cannot settle a job it lost. Enqueue
//! is a `MULTI/EXEC` pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, Script};
use mockable::Clock;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{JobQueue, JobQueueError, JobSource};
use crate::domain::{JobEnvelope, JobOptions, QueueName, QueueStats};
use crate::outbound::cache::{RedisPool, RedisPoolError};

/// Dead-letter entries kept per queue.
pub const FAILED_LIST_CAP: isize = 1_000;
/// Lease granted to a reserved job unless configured otherwise.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(600);

const PRIORITY_WEIGHT: f64 = 1e13;

const RESERVE_SCRIPT: &str = r#"
local wait, delayed, active = KEYS[1], KEYS[2], KEYS[3]
local now, deadline, job_prefix, lease = tonumber(ARGV[1]), tonumber(ARGV[2]), ARGV[3], ARGV[4]

local function requeue(source)
  local ids = redis.call('ZRANGEBYSCORE', source, '-inf', now)
  for _, id in ipairs(ids) do
    redis.call('ZREM', source, id)
    redis.call('HDEL', job_prefix .. id, 'lease')
    local score = redis.call('HGET', job_prefix .. id, 'score')
    if score then
      redis.call('ZADD', wait, score, id)
    end
  end
  return #ids
end

local stalled = requeue(active)
requeue(delayed)

while true do
  local popped = redis.call('ZPOPMIN', wait)
  if #popped == 0 then
    return {false, false, stalled}
  end
  local id = popped[1]
  local body = redis.call('HGET', job_prefix .. id, 'body')
  if body then
    redis.call('ZADD', active, deadline, id)
    redis.call('HSET', job_prefix .. id, 'lease', lease)
    return {id, body, stalled}
  end
end
"#;

/// Prepended to every lease-checked script.
///
/// KEYS[1] is the active set, KEYS[2] the job hash; ARGV[1] is the job id,
/// ARGV[2] the caller's lease token. Returns 0 when the lease is gone.
const LEASE_GUARD: &str = r#"
if redis.call('HGET', KEYS[2], 'lease') ~= ARGV[2]
    or not redis.call('ZSCORE', KEYS[1], ARGV[1]) then
  return 0
end
"#;

/// ARGV[3]: new lease deadline.
const EXTEND_SCRIPT: &str = r#"
redis.call('ZADD', KEYS[1], 'XX', ARGV[3], ARGV[1])
return 1
"#;

const ACK_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('DEL', KEYS[2])
return 1
"#;

/// KEYS[3]: delayed set. ARGV[3]: body after the failure, ARGV[4]: ready-at.
const RETRY_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], 'body', ARGV[3])
redis.call('HDEL', KEYS[2], 'lease')
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[1])
return 1
"#;

/// KEYS[3]: dead-letter list. ARGV[3]: body after the failure, ARGV[4]: cap.
const BURY_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('DEL', KEYS[2])
redis.call('LPUSH', KEYS[3], ARGV[3])
redis.call('LTRIM', KEYS[3], 0, tonumber(ARGV[4]) - 1)
return 1
"#;

fn lease_checked(body: &str) -> Script {
    Script::new(&format!("{LEASE_GUARD}{body}"))
}

/// Compiled queue scripts, shared by clones of the adapter.
struct QueueScripts {
    reserve: Script,
    extend: Script,
    ack: Script,
    retry: Script,
    bury: Script,
}

impl QueueScripts {
    fn new() -> Self {
        Self {
            reserve: Script::new(RESERVE_SCRIPT),
            extend: lease_checked(EXTEND_SCRIPT),
            ack: lease_checked(ACK_SCRIPT),
            retry: lease_checked(RETRY_SCRIPT),
            bury: lease_checked(BURY_SCRIPT),
        }
    }
}

/// Key layout of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueKeys {
    job_prefix: String,
    wait: String,
    delayed: String,
    active: String,
    failed: String,
}

impl QueueKeys {
    fn new(prefix: &str, queue: QueueName) -> Self {
        let base = format!("{prefix}:queue:{}", queue.as_str());
        Self {
            job_prefix: format!("{base}:job:"),
            wait: format!("{base}:wait"),
            delayed: format!("{base}:delayed"),
            active: format!("{base}:active"),
            failed: format!("{base}:failed"),
        }
    }

    fn job(&self, id: &str) -> String {
        format!("{}{id}", self.job_prefix)
    }
}

/// Wait-set score: priority first, then FIFO by enqueue time.
fn wait_score(job: &JobEnvelope) -> f64 {
    f64::from(job.priority) * PRIORITY_WEIGHT + job.enqueued_at_ms as f64
}

fn map_error(error: RedisPoolError) -> JobQueueError {
    if error.is_connection() {
        JobQueueError::unavailable(error.message())
    } else {
        JobQueueError::rejected(error.message())
    }
}

fn map_redis(error: redis::RedisError) -> JobQueueError {
    map_error(error.into())
}

fn encode(job: &JobEnvelope) -> Result<String, JobQueueError> {
    serde_json::to_string(job).map_err(|err| JobQueueError::rejected(err.to_string()))
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn lease_of(job: &JobEnvelope) -> Result<&str, JobQueueError> {
    job.lease
        .as_deref()
        .ok_or_else(|| JobQueueError::lease_lost(format!("job {} was not reserved", job.id)))
}

/// Map a guarded script's result: 0 means the lease was gone.
fn guarded(job: &JobEnvelope, applied: i64) -> Result<(), JobQueueError> {
    if applied == 0 {
        return Err(JobQueueError::lease_lost(format!(
            "job {} is no longer leased to this delivery",
            job.id
        )));
    }
    Ok(())
}

/// Redis implementation of both queue ports.
#[derive(Clone)]
pub struct RedisJobQueue {
    pool: RedisPool,
    prefix: String,
    lease: Duration,
    clock: Arc<dyn Clock>,
    scripts: Arc<QueueScripts>,
}

impl RedisJobQueue {
    /// Create a queue writing under `prefix`.
    pub fn new(pool: RedisPool, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            lease: DEFAULT_LEASE,
            clock,
            scripts: Arc::new(QueueScripts::new()),
        }
    }

    /// Override how long a reserved job may run before it counts as
    /// stalled.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    fn keys(&self, queue: QueueName) -> QueueKeys {
        QueueKeys::new(&self.prefix, queue)
    }

    fn now_ms(&self) -> i64 {
        self.clock.utc().timestamp_millis()
    }

    fn deadline_ms(&self) -> i64 {
        self.now_ms().saturating_add(duration_ms(self.lease))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        name: &str,
        data: Value,
        options: JobOptions,
    ) -> Result<String, JobQueueError> {
        let now = self.now_ms();
        let job = JobEnvelope::new(queue, name, data, &options, now);
        let body = encode(&job)?;
        let score = wait_score(&job);
        let keys = self.keys(queue);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(keys.job(&job.id), &[("body", body), ("score", score.to_string())])
            .ignore();
        match options.delay.filter(|delay| !delay.is_zero()) {
            Some(delay) => {
                pipe.zadd(&keys.delayed, &job.id, now.saturating_add(duration_ms(delay)))
                    .ignore();
            }
            None => {
                pipe.zadd(&keys.wait, &job.id, score).ignore();
            }
        }

        let mut conn = self.pool.get().await.map_err(map_error)?;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(map_redis)?;
        info!(queue = %queue, job_id = %job.id, name, priority = job.priority, "job enqueued");
        Ok(job.id)
    }

    async fn stats(&self) -> Result<Vec<QueueStats>, JobQueueError> {
        let mut pipe = redis::pipe();
        for queue in QueueName::ALL {
            let keys = self.keys(queue);
            pipe.zcard(&keys.wait)
                .zcard(&keys.delayed)
                .zcard(&keys.active)
                .llen(&keys.failed);
        }

        let mut conn = self.pool.get().await.map_err(map_error)?;
        let counts: Vec<u64> = pipe.query_async(&mut *conn).await.map_err(map_redis)?;

        Ok(QueueName::ALL
            .into_iter()
            .zip(counts.chunks(4))
            .map(|(queue, chunk)| QueueStats {
                queue,
                waiting: chunk.first().copied().unwrap_or_default(),
                delayed: chunk.get(1).copied().unwrap_or_default(),
                active: chunk.get(2).copied().unwrap_or_default(),
                failed: chunk.get(3).copied().unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl JobSource for RedisJobQueue {
    async fn reserve(&self, queue: QueueName) -> Result<Option<JobEnvelope>, JobQueueError> {
        let keys = self.keys(queue);
        let now = self.now_ms();
        let deadline = now.saturating_add(duration_ms(self.lease));
        let lease = Uuid::new_v4().to_string();

        let mut conn = self.pool.get().await.map_err(map_error)?;
        let (id, body, stalled): (Option<String>, Option<String>, i64) = self
            .scripts
            .reserve
            .key(&keys.wait)
            .key(&keys.delayed)
            .key(&keys.active)
            .arg(now)
            .arg(deadline)
            .arg(&keys.job_prefix)
            .arg(&lease)
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis)?;

        if stalled > 0 {
            warn!(queue = %queue, stalled, "stalled jobs returned to waiting");
        }
        let (Some(id), Some(body)) = (id, body) else {
            return Ok(None);
        };
        let mut job: JobEnvelope = serde_json::from_str(&body).map_err(|err| {
            JobQueueError::rejected(format!("undecodable job {id}: {err}"))
        })?;
        job.lease = Some(lease);
        debug!(queue = %queue, job_id = %job.id, attempt = job.current_attempt(), "job reserved");
        Ok(Some(job))
    }

    async fn extend(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        let lease = lease_of(job)?;
        let keys = self.keys(job.queue);
        let mut conn = self.pool.get().await.map_err(map_error)?;
        let applied: i64 = self
            .scripts
            .extend
            .key(&keys.active)
            .key(keys.job(&job.id))
            .arg(&job.id)
            .arg(lease)
            .arg(self.deadline_ms())
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis)?;
        guarded(job, applied)
    }

    async fn ack(&self, job: &JobEnvelope) -> Result<(), JobQueueError> {
        let lease = lease_of(job)?;
        let keys = self.keys(job.queue);
        let mut conn = self.pool.get().await.map_err(map_error)?;
        let applied: i64 = self
            .scripts
            .ack
            .key(&keys.active)
            .key(keys.job(&job.id))
            .arg(&job.id)
            .arg(lease)
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis)?;
        guarded(job, applied)
    }

    async fn retry(
        &self,
        job: &JobEnvelope,
        delay: Duration,
        reason: &str,
    ) -> Result<(), JobQueueError> {
        let lease = lease_of(job)?;
        let keys = self.keys(job.queue);
        let body = encode(&job.after_failure(reason))?;
        let ready_at = self.now_ms().saturating_add(duration_ms(delay));

        let mut conn = self.pool.get().await.map_err(map_error)?;
        let applied: i64 = self
            .scripts
            .retry
            .key(&keys.active)
            .key(keys.job(&job.id))
            .key(&keys.delayed)
            .arg(&job.id)
            .arg(lease)
            .arg(body)
            .arg(ready_at)
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis)?;
        guarded(job, applied)
    }

    async fn bury(&self, job: &JobEnvelope, reason: &str) -> Result<(), JobQueueError> {
        let lease = lease_of(job)?;
        let keys = self.keys(job.queue);
        let body = encode(&job.after_failure(reason))?;

        let mut conn = self.pool.get().await.map_err(map_error)?;
        let applied: i64 = self
            .scripts
            .bury
            .key(&keys.active)
            .key(keys.job(&job.id))
            .key(&keys.failed)
            .arg(&job.id)
            .arg(lease)
            .arg(body)
            .arg(FAILED_LIST_CAP)
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis)?;
        guarded(job, applied)
    }
}
