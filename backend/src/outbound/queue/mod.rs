//! Redis job queue implementing the producer (`JobQueue`) and consumer
//! (`JobSource`) ports.

mod redis_job_queue;

pub use redis_job_queue::{DEFAULT_LEASE, FAILED_LIST_CAP, RedisJobQueue};
