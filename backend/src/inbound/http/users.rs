//! Account and token endpoints.
//!
//! ```text
//! POST /api/v1/auth/register {"username":"ada","email":"ada@example.com","password":"..."}
//! POST /api/v1/auth/login {"login":"ada","password":"..."}
//! POST /api/v1/auth/refresh {"refreshToken":"..."}
//! POST /api/v1/auth/logout
//! GET /api/v1/auth/me
//! POST /api/v1/auth/password {"currentPassword":"...","newPassword":"..."}
//! ```

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Error, LoginCredentials, NewPassword, Registration, TokenPair, User};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::Authenticated;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, login_error, missing_field_error, password_error, registration_error,
};

/// Registration body for `POST /api/v1/auth/register`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[schema(example = "ada_l")]
    pub username: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
}

/// Login body for `POST /api/v1/auth/login`.
///
/// `login` accepts a username or an email; `username` is accepted as an
/// alias.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "username")]
    #[schema(example = "ada_l")]
    pub login: String,
    pub password: String,
}

/// Body for `POST /api/v1/auth/refresh`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Body for `POST /api/v1/auth/password`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Register a new account with the `user` role.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid request", body = Error),
        (status = 409, description = "Username or email taken", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["auth"],
    operation_id = "register",
    security([])
)]
#[post("/auth/register")]
pub async fn register(
    state: web::Data<HttpState>,
    payload: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    let RegisterRequest {
        username,
        email,
        password,
    } = payload.into_inner();
    let registration =
        Registration::try_from_parts(&username, &email, &password).map_err(registration_error)?;
    let user = state.auth.register(registration).await?;
    Ok(HttpResponse::Created().json(user))
}

/// Exchange credentials for an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Invalid credentials", body = Error),
        (status = 503, description = "Token store unavailable", body = Error)
    ),
    tags = ["auth"],
    operation_id = "login",
    security([])
)]
#[post("/auth/login")]
pub async fn login(
    state: web::Data<HttpState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<web::Json<TokenPair>> {
    let LoginRequest { login, password } = payload.into_inner();
    let credentials = LoginCredentials::try_from_parts(&login, &password).map_err(login_error)?;
    let pair = state.auth.login(&credentials).await?;
    Ok(web::Json(pair))
}

/// Rotate a refresh token into a fresh pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Refresh token rejected", body = Error)
    ),
    tags = ["auth"],
    operation_id = "refresh",
    security([])
)]
#[post("/auth/refresh")]
pub async fn refresh(
    state: web::Data<HttpState>,
    payload: web::Json<RefreshRequest>,
) -> ApiResult<web::Json<TokenPair>> {
    let token = payload
        .into_inner()
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| missing_field_error(FieldName::new("refreshToken")))?;
    let pair = state.auth.refresh(token.trim()).await?;
    Ok(web::Json(pair))
}

/// Revoke the caller's refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["auth"],
    operation_id = "logout"
)]
#[post("/auth/logout")]
pub async fn logout(
    state: web::Data<HttpState>,
    user: Authenticated,
) -> ApiResult<HttpResponse> {
    state.auth.logout(&user.principal().user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Profile of the authenticated user.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 404, description = "Account removed", body = Error)
    ),
    tags = ["auth"],
    operation_id = "currentUser"
)]
#[get("/auth/me")]
pub async fn current_user(
    state: web::Data<HttpState>,
    user: Authenticated,
) -> ApiResult<web::Json<User>> {
    let profile = state.auth.me(&user.principal().user_id).await?;
    Ok(web::Json(profile))
}

/// Change the caller's password and revoke their refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Current password rejected", body = Error)
    ),
    tags = ["auth"],
    operation_id = "changePassword"
)]
#[post("/auth/password")]
pub async fn change_password(
    state: web::Data<HttpState>,
    user: Authenticated,
    payload: web::Json<ChangePasswordRequest>,
) -> ApiResult<HttpResponse> {
    let ChangePasswordRequest {
        current_password,
        new_password,
    } = payload.into_inner();
    let new_password = NewPassword::new(&new_password)
        .map_err(|err| password_error(FieldName::new("newPassword"), err))?;
    state
        .auth
        .change_password(&user.principal().user_id, &current_password, new_password)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
