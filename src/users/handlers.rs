use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdminCreateUserRequest, AdminUpdateUserRequest, ChangePasswordRequest, DeletedResponse,
        UpdateProfileRequest,
    },
    repo_types::{User, UserChanges},
    services::{avatar_data_url, new_user_from, non_blank, validate_height, validate_password},
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{AdminUser, CurrentUser},
        services::{hash_password, verify_password},
    },
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    seed,
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/account/profile", get(get_profile).put(update_profile))
        .route("/api/account/password", put(change_password))
        .route("/api/account/avatar", post(upload_avatar))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/:id", put(update_user).delete(delete_user))
}

// --- account ---

#[instrument(skip_all)]
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

fn profile_changes(req: UpdateProfileRequest) -> AppResult<UserChanges> {
    Ok(UserChanges {
        fullname: non_blank(req.fullname),
        birthday: req.birthday,
        height: validate_height(req.height)?,
        gender: non_blank(req.gender),
        group_id: None,
    })
}

#[instrument(skip(state, payload, user))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    let changes = profile_changes(payload)?;
    let updated = state
        .users
        .update_user(user.id, &changes)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(updated))
}

#[instrument(skip(state, payload, user))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(AppError::InvalidCredentials);
    }
    validate_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    state.users.set_password(user.id, &hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse { message: "Password changed" }))
}

/// POST /api/account/avatar (multipart, field `avatar`)
#[instrument(skip(state, mp, user))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<User>> {
    let mut mp = mp.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let mut avatar = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("avatar") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        avatar = Some(avatar_data_url(&content_type, &data)?);
        break;
    }

    let avatar = avatar.ok_or_else(|| AppError::BadRequest("avatar file is required".into()))?;
    let updated = state
        .users
        .set_avatar(user.id, &avatar)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    info!(user_id = %user.id, bytes = avatar.len(), "avatar updated");
    Ok(Json(updated))
}

// --- admin ---

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.list_users().await?))
}

async fn require_group(state: &AppState, group_id: Option<Uuid>) -> AppResult<Option<Uuid>> {
    match group_id {
        Some(id) => match state.groups.find_group(id).await? {
            Some(g) => Ok(Some(g.id)),
            None => Err(AppError::NotFound("Group not found".into())),
        },
        None => Ok(None),
    }
}

#[instrument(skip(state, payload, admin))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppJson(payload): AppJson<AdminCreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let group_id = match require_group(&state, payload.group_id).await? {
        Some(id) => Some(id),
        None => state
            .groups
            .find_group_by_name(seed::MEMBER_GROUP)
            .await?
            .map(|g| g.id),
    };
    let new_user = new_user_from(&payload.user, group_id)?;
    if state.users.find_user_by_username(&new_user.username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let user = state
        .users
        .create_user(&new_user)
        .await
        .map_err(|e| AppError::duplicate_as_conflict(e, "Username already taken"))?;
    info!(admin_id = %admin.id, user_id = %user.id, "user created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload, admin))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<AdminUpdateUserRequest>,
) -> AppResult<Json<User>> {
    let mut changes = profile_changes(payload.profile)?;
    changes.group_id = require_group(&state, payload.group_id).await?;

    let password_hash = match payload.password.as_deref() {
        Some(p) => {
            validate_password(p)?;
            Some(hash_password(p)?)
        }
        None => None,
    };

    let mut updated = state
        .users
        .update_user(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if let Some(hash) = password_hash {
        state.users.set_password(id, &hash).await?;
        updated.password_hash = hash;
    }

    info!(admin_id = %admin.id, user_id = %id, "user updated by admin");
    Ok(Json(updated))
}

/// Messages and metrics of the deleted user are kept.
#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<DeletedResponse>> {
    if id == admin.id {
        return Err(AppError::Conflict("You cannot delete your own account".into()));
    }
    if let Some(bot) = seed::find_bot(&state).await? {
        if bot.id == id {
            return Err(AppError::Conflict("The coach account cannot be deleted".into()));
        }
    }
    if !state.users.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(admin_id = %admin.id, user_id = %id, "user deleted");
    Ok(Json(DeletedResponse { message: "User deleted", id }))
}
