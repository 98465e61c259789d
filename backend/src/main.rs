//! Server entry-point: loads settings, prepares Postgres and Redis, wires
//! REST endpoints and OpenAPI docs.

mod server;

use std::ffi::OsString;
use std::sync::Arc;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use vk_monitor::domain::{EmailAddress, NewPassword, Username};
use vk_monitor::inbound::http::health::HealthState;
use vk_monitor::outbound::cache::{RedisPool, RedisPoolConfig};
use vk_monitor::outbound::persistence::{DbPool, PoolConfig, run_pending_migrations};
use vk_monitor::settings::AppSettings;

use server::{PostgresCheck, RedisCheck, ServerAuthService, ServerConfig, build_services, create_server};

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{context}: {err}"))
}

async fn bootstrap_admin(auth: &ServerAuthService, settings: &AppSettings) -> std::io::Result<()> {
    let Some(admin) = settings
        .admin_bootstrap()
        .map_err(|err| startup_error("invalid admin settings", err))?
    else {
        return Ok(());
    };
    let username =
        Username::new(admin.username).map_err(|err| startup_error("invalid admin username", err))?;
    let email =
        EmailAddress::new(&admin.email).map_err(|err| startup_error("invalid admin email", err))?;
    let password = NewPassword::new(&admin.password)
        .map_err(|err| startup_error("invalid admin password", err))?;
    let created = auth
        .ensure_admin(username, email, password)
        .await
        .map_err(|err| startup_error("admin bootstrap failed", err))?;
    if created {
        info!("admin account created");
    }
    Ok(())
}

/// Application bootstrap.
#[actix_web::main]
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
    let bind_addr = settings
        .bind_addr()
        .map_err(|err| startup_error("invalid bind address", err))?;

    let database_url = settings
        .require_database_url()
        .map_err(|err| startup_error("database", err))?;
    if settings.run_migrations {
        run_pending_migrations(database_url)
            .await
            .map_err(|err| startup_error("migrations failed", err))?;
    }
    let db_pool = DbPool::new(
        PoolConfig::new(database_url)
            .with_max_size(settings.db_pool_size())
            .with_connection_timeout(settings.db_connection_timeout()),
    )
    .await
    .map_err(|err| startup_error("postgres", err))?;

    let redis_url = settings
        .require_redis_url()
        .map_err(|err| startup_error("redis", err))?;
    let redis_pool = RedisPool::new(
        RedisPoolConfig::new(redis_url).with_max_size(settings.redis_pool_size()),
    )
    .await
    .map_err(|err| startup_error("redis", err))?;

    let services = build_services(&db_pool, &redis_pool, &settings)
        .map_err(|err| startup_error("invalid settings", err))?;
    bootstrap_admin(&services.auth, &settings).await?;

    let health_state = web::Data::new(
        HealthState::new()
            .with_check("postgres", Arc::new(PostgresCheck(db_pool)))
            .with_check("redis", Arc::new(RedisCheck(redis_pool))),
    );
    info!(%bind_addr, "starting HTTP server");
    let server = create_server(
        health_state.clone(),
        services.http_state,
        &ServerConfig::new(bind_addr),
    )?;
    let result = server.await;
    health_state.mark_unhealthy();
    result
}
