//! Health endpoints: liveness & readiness checks for orchestration and load balancers.
//!
//! Readiness additionally pings every registered [`ReadinessCheck`] so a
//! server that lost Postgres or Redis drops out of rotation.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{HttpResponse, get, http::header, web};
use async_trait::async_trait;
use tracing::warn;

/// Dependency pinged by the readiness endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Succeed when the dependency answers.
    async fn check(&self) -> Result<(), String>;
}

/// Shared health state for readiness and liveness checks.
pub struct HealthState {
    ready: AtomicBool,
    live: AtomicBool,
    checks: Vec<(&'static str, Arc<dyn ReadinessCheck>)>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(false),
            live: AtomicBool::new(true),
            checks: Vec::new(),
        }
    }
}

impl HealthState {
    /// Create a new health state starting as not ready but live.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency pinged on every readiness request.
    pub fn with_check(mut self, name: &'static str, check: Arc<dyn ReadinessCheck>) -> Self {
        self.checks.push((name, check));
        self
    }

    /// Mark the service as ready.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Flag the service as unhealthy so liveness checks fail fast during shutdown.
    pub fn mark_unhealthy(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Return readiness state.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Return liveness state. When false, liveness checks emit 503 to trigger restarts.
    pub fn is_alive(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn dependencies_ok(&self) -> bool {
        for (name, check) in &self.checks {
            if let Err(reason) = check.check().await {
                warn!(dependency = *name, %reason, "readiness check failed");
                return false;
            }
        }
        true
    }

    fn status_response(is_ready: bool) -> HttpResponse {
        let mut response = if is_ready {
            HttpResponse::Ok()
        } else {
            HttpResponse::ServiceUnavailable()
        };

        response
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }
}

/// Readiness check. Return 200 when started and every dependency answers; 503 otherwise.
#[utoipa::path(
    get,
    path = "/health/ready",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Server is ready to handle traffic"),
        (status = 503, description = "Server is starting or a dependency is down")
    )
)]
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    let ok = state.is_ready() && state.dependencies_ok().await;
    HealthState::status_response(ok)
}

/// Liveness check. Return 200 while the process is marked alive and 503 once draining.
#[utoipa::path(
    get,
    path = "/health/live",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Server is alive"),
        (status = 503, description = "Server is shutting down")
    )
)]
#[get("/health/live")]
pub async fn live(state: web::Data<HealthState>) -> HttpResponse {
    HealthState::status_response(state.is_alive())
}

#[cfg(test)]
mod tests {
    //! Health responses across lifecycle and dependency states.
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};

    async fn call(state: HealthState, uri: &str) -> actix_web::dev::ServiceResponse {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(ready)
                .service(live),
        )
        .await;
        test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await
    }

    fn check(result: Result<(), String>) -> Arc<dyn ReadinessCheck> {
        let mut check = MockReadinessCheck::new();
        check.expect_check().returning(move || result.clone());
        Arc::new(check)
    }

    #[actix_web::test]
    async fn not_ready_until_marked() {
        let response = call(HealthState::new(), "/health/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
    }

    #[actix_web::test]
    async fn ready_when_marked_and_dependencies_answer() {
        let state = HealthState::new().with_check("postgres", check(Ok(())));
        state.mark_ready();
        let response = call(state, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn failing_dependency_makes_the_server_unready() {
        let state = HealthState::new()
            .with_check("postgres", check(Ok(())))
            .with_check("redis", check(Err("connection refused".to_owned())));
        state.mark_ready();
        let response = call(state, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn liveness_flips_when_draining() {
        let state = HealthState::new();
        state.mark_unhealthy();
        let response = call(state, "/health/live").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
