//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::ServerConfig;
pub use state_builders::{PostgresCheck, RedisCheck, ServerAuthService, Services, build_services};

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use vk_monitor::Trace;
#[cfg(debug_assertions)]
use vk_monitor::doc::ApiDoc;
use vk_monitor::inbound::http::comments::{
    analyze_comment, create_comment, delete_comment, get_comment, list_comments, update_comment,
};
use vk_monitor::inbound::http::dashboard::dashboard;
use vk_monitor::inbound::http::error::{json_config, query_config};
use vk_monitor::inbound::http::groups::{delete_group, list_groups, upload_groups};
use vk_monitor::inbound::http::health::{HealthState, live, ready};
use vk_monitor::inbound::http::keywords::{
    bulk_create_keywords, create_keyword, delete_keyword, get_keyword, list_keywords,
    update_keyword,
};
use vk_monitor::inbound::http::posts::list_posts;
use vk_monitor::inbound::http::state::HttpState;
use vk_monitor::inbound::http::tasks::{enqueue_task, get_task, get_task_status, list_tasks};
use vk_monitor::inbound::http::users::{
    change_password, current_user, login, logout, refresh, register,
};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    // Literal segments (`/keywords/bulk`) are registered before `{id}` routes.
    let api = web::scope("/api/v1")
        .service(register)
        .service(login)
        .service(refresh)
        .service(logout)
        .service(current_user)
        .service(change_password)
        .service(list_comments)
        .service(create_comment)
        .service(analyze_comment)
        .service(get_comment)
        .service(update_comment)
        .service(delete_comment)
        .service(list_keywords)
        .service(create_keyword)
        .service(bulk_create_keywords)
        .service(get_keyword)
        .service(update_keyword)
        .service(delete_keyword)
        .service(list_groups)
        .service(upload_groups)
        .service(delete_group)
        .service(list_posts)
        .service(enqueue_task)
        .service(list_tasks)
        .service(get_task_status)
        .service(get_task)
        .service(dashboard);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(json_config())
        .app_data(query_config())
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

/// Construct an Actix HTTP server using the provided health state and configuration.
///
/// # Parameters
/// - `health_state`: shared readiness state updated once the server is initialised.
/// - `http_state`: wired driving ports shared by every worker thread.
/// - `config`: pre-built [`ServerConfig`] holding the bind address.
///
/// # Returns
/// A spawned [`Server`] that must be awaited to drive the listener.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket or starting the server fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    config: &ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let server = HttpServer::new(move || build_app(server_health_state.clone(), http_state.clone()))
        .bind(config.bind_addr())?
        .run();

    health_state.mark_ready();
    Ok(server)
}
