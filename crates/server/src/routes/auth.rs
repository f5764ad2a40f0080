//! Account registration, login and session routes.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

use mercado_core::loyalty::LoyaltySummary;

use crate::db::users::User;
use crate::error::{ErrorBody, Result, clear_sentry_user, set_sentry_user};
use crate::extract::AppJson;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::auth::AuthService;
use crate::services::email::OutgoingEmail;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub loyalty: LoyaltySummary,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", post(change_password))
}

/// Start a logged-in session for `user`.
pub(crate) async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = User),
        (status = 400, description = "Invalid email, name or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
#[instrument(skip(state, session, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<(StatusCode, AppJson<User>)> {
    let user = AuthService::new(state.pool())
        .register(&request.email, &request.password, &request.name)
        .await?;

    start_session(&session, &user).await?;
    state.notify(OutgoingEmail::Welcome {
        to: user.email.to_string(),
        name: user.name.clone(),
    });

    info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, AppJson(user)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = User),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many attempts"),
    )
)]
#[instrument(skip(state, session, request))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<AppJson<User>> {
    let user = AuthService::new(state.pool())
        .login(&request.email, &request.password)
        .await?;

    start_session(&session, &user).await?;
    info!(user_id = %user.id, "User logged in");
    Ok(AppJson(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user with loyalty summary", body = MeResponse),
        (status = 401, description = "Not logged in", body = ErrorBody),
    )
)]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<AppJson<MeResponse>> {
    let user = AuthService::new(state.pool()).get_user(current.id).await?;
    let loyalty = LoyaltySummary::new(user.loyalty_points, user.lifetime_points);
    Ok(AppJson(MeResponse { user, loyalty }))
}

#[utoipa::path(
    post,
    path = "/auth/password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too weak", body = ErrorBody),
        (status = 401, description = "Current password is wrong", body = ErrorBody),
    )
)]
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<ChangePasswordRequest>,
) -> Result<StatusCode> {
    AuthService::new(state.pool())
        .change_password(user.id, &request.current_password, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
