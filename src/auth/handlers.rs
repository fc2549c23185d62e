use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
            RegisteredResponse,
        },
        services::{normalize_username, verify_password},
        tokens::{JwtKeys, TokenKind},
    },
    error::{AppError, AppResult},
    extract::AppJson,
    seed,
    state::AppState,
    users::{repo_types::User, services::new_user_from},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/dangky", post(register))
        .route("/dangnhap", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/adminreset", get(admin_reset))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisteredResponse>)> {
    let member_group = state.groups.find_group_by_name(seed::MEMBER_GROUP).await?;
    let new_user = new_user_from(&payload, member_group.map(|g| g.id)).map_err(|e| {
        warn!(error = %e, "registration rejected");
        e
    })?;

    if state.users.find_user_by_username(&new_user.username).await?.is_some() {
        warn!(username = %new_user.username, "username already registered");
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let user = state
        .users
        .create_user(&new_user)
        .await
        .map_err(|e| AppError::duplicate_as_conflict(e, "Username already taken"))?;

    info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse { message: "Registration successful", user }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let username = normalize_username(&payload.username);

    let Some(user) = state.users.find_user_by_username(&username).await? else {
        warn!(%username, "login unknown username");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, role = user.role.as_str(), "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify(&payload.refresh_token, TokenKind::Refresh).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthenticated
    })?;

    let user = state
        .users
        .find_user(claims.sub)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn admin_reset(State(state): State<AppState>) -> AppResult<Json<MessageResponse>> {
    if !state.config.admin_reset_enabled {
        return Err(AppError::NotFound("Not found".into()));
    }
    seed::reset_admin(&state).await?;
    Ok(Json(MessageResponse { message: "Admin account reset" }))
}

fn issue_tokens(state: &AppState, user: User) -> anyhow::Result<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        tokens: keys.issue_pair(user.id)?,
        user,
    })
}
