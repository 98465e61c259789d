//! Queue worker: reserves jobs from Redis and runs collection, group
//! validation and analysis tasks against the VK API.

use std::ffi::OsString;
use std::sync::Arc;

use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use reqwest::Url;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zeroize::Zeroizing;

use vk_monitor::domain::{TaskProcessor, TaskProcessorConfig, TaskProcessorPorts};
use vk_monitor::inbound::worker::{Worker, WorkerConfig};
use vk_monitor::outbound::cache::{RedisPool, RedisPoolConfig, RedisTaskStatusStore};
use vk_monitor::outbound::persistence::{
    DbPool, DieselCommentRepository, DieselGroupRepository, DieselKeywordRepository,
    DieselPostRepository, DieselTaskRepository, PoolConfig,
};
use vk_monitor::outbound::queue::RedisJobQueue;
use vk_monitor::outbound::vk::{VkHttpConfig, VkHttpSource};
use vk_monitor::settings::AppSettings;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{context}: {err}"))
}

fn vk_config(settings: &AppSettings) -> std::io::Result<VkHttpConfig> {
    let api_url = Url::parse(settings.vk_api_url())
        .map_err(|err| startup_error("invalid VK API URL", err))?;
    let access_token = settings
        .require_vk_access_token()
        .map_err(|err| startup_error("vk", err))?;
    Ok(VkHttpConfig {
        api_url,
        access_token: Zeroizing::new(access_token.to_owned()),
        version: settings.vk_api_version().to_owned(),
        min_interval: settings.vk_min_interval(),
        timeout: settings.vk_timeout(),
    })
}

async fn shutdown_on_ctrl_c(stop: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested, finishing in-flight jobs"),
        Err(err) => warn!(error = %err, "failed to listen for ctrl-c; stopping"),
    }
    if stop.send(true).is_err() {
        info!("worker already stopped");
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load_from_iter(std::env::args_os().collect::<Vec<OsString>>())
        .map_err(|err| startup_error("failed to load settings", err))?;

    let database_url = settings
        .require_database_url()
        .map_err(|err| startup_error("database", err))?;
    let db = DbPool::new(
        PoolConfig::new(database_url)
            .with_max_size(settings.db_pool_size())
            .with_connection_timeout(settings.db_connection_timeout()),
    )
    .await
    .map_err(|err| startup_error("postgres", err))?;
    let redis_url = settings
        .require_redis_url()
        .map_err(|err| startup_error("redis", err))?;
    let redis = RedisPool::new(
        RedisPoolConfig::new(redis_url).with_max_size(settings.redis_pool_size()),
    )
    .await
    .map_err(|err| startup_error("redis", err))?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let prefix = settings.redis_prefix();
    let vk = VkHttpSource::new(vk_config(&settings)?)
        .map_err(|err| startup_error("failed to build VK client", err))?;

    let processor = TaskProcessor::new(
        TaskProcessorPorts {
            tasks: Arc::new(DieselTaskRepository::new(db.clone())),
            status_store: Arc::new(RedisTaskStatusStore::new(redis.clone(), prefix)),
            comments: Arc::new(DieselCommentRepository::new(db.clone())),
            posts: Arc::new(DieselPostRepository::new(db.clone())),
            keywords: Arc::new(DieselKeywordRepository::new(db.clone())),
            groups: Arc::new(DieselGroupRepository::new(db)),
            vk: Arc::new(vk),
        },
        clock.clone(),
        TaskProcessorConfig {
            vk_max_attempts: settings.vk_max_attempts(),
            initial_backoff: settings.vk_retry_backoff(),
            ..TaskProcessorConfig::default()
        },
    );
    let queue = RedisJobQueue::new(redis, prefix, clock).with_lease(settings.queue_lease());
    let worker = Worker::new(
        Arc::new(queue),
        Arc::new(processor),
        WorkerConfig {
            concurrency: settings.worker_concurrency(),
            poll_interval: settings.worker_poll_interval(),
            lease_renewal: settings.worker_lease_renewal(),
            ..WorkerConfig::default()
        },
    );

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(shutdown_on_ctrl_c(stop));
    worker.run(shutdown).await;
    Ok(())
}
