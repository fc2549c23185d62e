use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateGroupRequest, DeletedGroupResponse, UpdateGroupRequest},
    repo_types::{Group, GroupChanges, NewGroup},
};
use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    seed,
    state::AppState,
    users::services::non_blank,
};

pub fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/groups", get(list_groups).post(create_group))
        .route("/admin/groups/:id", put(update_group).delete(delete_group))
}

#[instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(state.groups.list_groups().await?))
}

#[instrument(skip(state, payload, admin))]
pub async fn create_group(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppJson(payload): AppJson<CreateGroupRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Group name is required".into()));
    }
    if state.groups.find_group_by_name(name).await?.is_some() {
        return Err(AppError::Conflict("Group name already exists".into()));
    }

    let group = state
        .groups
        .create_group(&NewGroup {
            name: name.to_string(),
            description: non_blank(payload.description),
            role: payload.role,
            permissions: payload.permissions,
        })
        .await
        .map_err(|e| AppError::duplicate_as_conflict(e, "Group name already exists"))?;
    info!(admin_id = %admin.id, group_id = %group.id, role = group.role.as_str(), "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// Seeded groups keep their name; the role of any group is fixed at creation.
#[instrument(skip(state, payload, admin))]
pub async fn update_group(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateGroupRequest>,
) -> AppResult<Json<Group>> {
    let current = state
        .groups
        .find_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;

    let name = non_blank(payload.name);
    if let Some(new_name) = name.as_deref().filter(|n| *n != current.name) {
        if seed::is_seeded_group(&current.name) {
            return Err(AppError::Conflict("Built-in groups cannot be renamed".into()));
        }
        if state.groups.find_group_by_name(new_name).await?.is_some() {
            return Err(AppError::Conflict("Group name already exists".into()));
        }
    }

    let changes = GroupChanges {
        name,
        description: payload.description.map(|d| d.trim().to_string()),
        permissions: payload.permissions,
    };
    let updated = state
        .groups
        .update_group(id, &changes)
        .await
        .map_err(|e| AppError::duplicate_as_conflict(e, "Group name already exists"))?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
    info!(admin_id = %admin.id, group_id = %id, "group updated");
    Ok(Json(updated))
}

/// Members of a deleted group are left without a group.
#[instrument(skip(state, admin))]
pub async fn delete_group(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<DeletedGroupResponse>> {
    let group = state
        .groups
        .find_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
    if seed::is_seeded_group(&group.name) {
        warn!(admin_id = %admin.id, group = %group.name, "built-in group delete refused");
        return Err(AppError::Conflict("Built-in groups cannot be deleted".into()));
    }

    if !state.groups.delete_group(id).await? {
        return Err(AppError::NotFound("Group not found".into()));
    }
    info!(admin_id = %admin.id, group_id = %id, "group deleted");
    Ok(Json(DeletedGroupResponse { message: "Group deleted", id }))
}
