//! Dashboard statistics endpoint.

use actix_web::{get, web};

use crate::domain::{DashboardStats, Error};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::state::HttpState;

/// Aggregate counts for groups, comments, keywords, tasks and queues.
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Statistics", body = DashboardStats),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["dashboard"],
    operation_id = "getDashboard"
)]
#[get("/dashboard")]
pub async fn dashboard(
    state: web::Data<HttpState>,
    _user: Authenticated,
) -> ApiResult<web::Json<DashboardStats>> {
    let stats = state.dashboard.stats().await?;
    Ok(web::Json(stats))
}
