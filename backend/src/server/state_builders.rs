//! Builders wiring Diesel, Redis and credential adapters into the domain
//! services behind [`HttpState`].

use std::sync::Arc;

use actix_web::web;
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use zeroize::Zeroizing;

use vk_monitor::domain::{
    AuthenticationService, CommentService, DashboardService, GroupService, JobOptions,
    KeywordService, PostService, TaskService,
};
use vk_monitor::inbound::http::health::ReadinessCheck;
use vk_monitor::inbound::http::state::HttpState;
use vk_monitor::outbound::auth::{Argon2PasswordHasher, JwtConfig, JwtTokenIssuer};
use vk_monitor::outbound::cache::{
    RedisPool, RedisRefreshTokenStore, RedisTaskStatusStore,
};
use vk_monitor::outbound::persistence::{
    DbPool, DieselCommentRepository, DieselGroupRepository, DieselKeywordRepository,
    DieselPostRepository, DieselTaskRepository, DieselUserRepository,
};
use vk_monitor::outbound::queue::RedisJobQueue;
use vk_monitor::settings::{AppSettings, SettingsError};

/// Concrete authentication service used by the server binary.
pub type ServerAuthService = AuthenticationService<
    DieselUserRepository,
    Argon2PasswordHasher,
    JwtTokenIssuer,
    RedisRefreshTokenStore,
>;

type ServerTaskService = TaskService<DieselTaskRepository, RedisTaskStatusStore, RedisJobQueue>;

/// Wired services: the handler state plus the auth service for bootstrap.
pub struct Services {
    pub http_state: web::Data<HttpState>,
    pub auth: Arc<ServerAuthService>,
}

/// Build every driving port from the two connection pools.
///
/// # Errors
/// Returns [`SettingsError`] when the JWT secret is missing or too short.
pub fn build_services(
    db: &DbPool,
    redis: &RedisPool,
    settings: &AppSettings,
) -> Result<Services, SettingsError> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let prefix = settings.redis_prefix();

    let users = Arc::new(DieselUserRepository::new(db.clone()));
    let comments_repo = Arc::new(DieselCommentRepository::new(db.clone()));
    let keywords_repo = Arc::new(DieselKeywordRepository::new(db.clone()));
    let groups_repo = Arc::new(DieselGroupRepository::new(db.clone()));
    let posts_repo = Arc::new(DieselPostRepository::new(db.clone()));
    let tasks_repo = Arc::new(DieselTaskRepository::new(db.clone()));

    let queue = Arc::new(
        RedisJobQueue::new(redis.clone(), prefix, clock.clone()).with_lease(settings.queue_lease()),
    );
    let status_store = Arc::new(RedisTaskStatusStore::new(redis.clone(), prefix));

    let tokens = JwtTokenIssuer::new(&JwtConfig {
        secret: Zeroizing::new(settings.require_jwt_secret()?.to_owned()),
        access_ttl: settings.access_ttl(),
        refresh_ttl: settings.refresh_ttl(),
    });
    let auth = Arc::new(AuthenticationService::new(
        users.clone(),
        Arc::new(Argon2PasswordHasher::new()),
        Arc::new(tokens),
        Arc::new(RedisRefreshTokenStore::new(redis.clone(), prefix)),
        clock.clone(),
    ));

    let tasks: Arc<ServerTaskService> = Arc::new(
        TaskService::new(tasks_repo.clone(), status_store, queue.clone(), clock.clone())
            .with_job_defaults(JobOptions {
                attempts: settings.queue_attempts(),
                backoff_ms: settings.queue_backoff_ms(),
                ..JobOptions::default()
            }),
    );
    let comments = Arc::new(CommentService::new(
        comments_repo.clone(),
        users,
        clock.clone(),
    ));
    let keywords = Arc::new(KeywordService::new(keywords_repo.clone(), clock.clone()));
    let groups = Arc::new(GroupService::new(groups_repo.clone(), tasks.clone(), clock));
    let posts = Arc::new(PostService::new(posts_repo));
    let dashboard = Arc::new(DashboardService::new(
        groups_repo,
        comments_repo,
        keywords_repo,
        tasks_repo,
        queue,
    ));

    let http_state = web::Data::new(HttpState {
        auth: auth.clone(),
        comments: comments.clone(),
        comments_query: comments,
        keywords: keywords.clone(),
        keywords_query: keywords,
        groups: groups.clone(),
        groups_query: groups,
        posts,
        tasks: tasks.clone(),
        tasks_query: tasks,
        dashboard,
    });
    Ok(Services { http_state, auth })
}

/// Readiness check pinging Postgres.
pub struct PostgresCheck(pub DbPool);

#[async_trait]
impl ReadinessCheck for PostgresCheck {
    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|err| err.to_string())
    }
}

/// Readiness check pinging Redis.
pub struct RedisCheck(pub RedisPool);

#[async_trait]
impl ReadinessCheck for RedisCheck {
    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|err| err.to_string())
    }
}
