use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ChatPartner, HistoryItem, SendMealRequest, SendMealResponse, SendRequest},
    repo_types::{Message, NewMessage, Page},
    services::{can_message, coach_reply, history, MEAL_PHOTO_CONTENT},
};
use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    seed,
    state::AppState,
    users::repo_types::User,
};

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat/users", get(list_partners))
        .route("/api/chat/history/:user_id", get(get_history))
        .route("/api/chat/send", post(send))
        .route("/api/chat/send-meal", post(send_meal))
}

#[instrument(skip_all)]
pub async fn list_partners(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Vec<ChatPartner>>> {
    let bot_id = seed::find_bot(&state).await?.map(|b| b.id);
    let partners = state
        .users
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.id != me.id && Some(u.id) != bot_id)
        .filter(|u| can_message(&me, u, bot_id))
        .map(ChatPartner::from)
        .collect();
    Ok(Json(partners))
}

#[instrument(skip(state, me))]
pub async fn get_history(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    AppPath(user_id): AppPath<Uuid>,
    AppQuery(page): AppQuery<Page>,
) -> AppResult<Json<Vec<HistoryItem>>> {
    Ok(Json(history(&state, me.id, user_id, page).await?))
}

/// Recipient of a new message, checked against the messaging rule.
async fn reachable_partner(state: &AppState, sender: &User, to: Uuid) -> AppResult<Option<Uuid>> {
    let partner = state
        .users
        .find_user(to)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipient not found".into()))?;
    let bot_id = seed::find_bot(state).await?.map(|b| b.id);
    if !can_message(sender, &partner, bot_id) {
        warn!(sender_id = %sender.id, recipient_id = %to, "message refused");
        return Err(AppError::Forbidden("You may not message this user".into()));
    }
    Ok(bot_id)
}

#[instrument(skip(state, payload, me))]
pub async fn send(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    AppJson(payload): AppJson<SendRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let content = payload.content.trim().to_string();
    let image = payload.image.filter(|i| !i.trim().is_empty());
    if content.is_empty() && image.is_none() {
        return Err(AppError::BadRequest("Message content or image is required".into()));
    }
    reachable_partner(&state, &me, payload.to).await?;

    let message = state
        .messages
        .insert_message(&NewMessage {
            sender_id: me.id,
            recipient_id: payload.to,
            content,
            image,
        })
        .await?;
    info!(sender_id = %me.id, recipient_id = %payload.to, message_id = %message.id, "message sent");
    Ok((StatusCode::CREATED, Json(message)))
}

/// The photo goes to `to`; the coach answers the caller.
#[instrument(skip(state, payload, me))]
pub async fn send_meal(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    AppJson(payload): AppJson<SendMealRequest>,
) -> AppResult<(StatusCode, Json<SendMealResponse>)> {
    if payload.image_base64.trim().is_empty() {
        return Err(AppError::BadRequest("image_base64 is required".into()));
    }
    let bot_id = reachable_partner(&state, &me, payload.to)
        .await?
        .ok_or_else(|| anyhow::anyhow!("coach account {} is missing", state.config.bot_username))?;

    let message = state
        .messages
        .insert_message(&NewMessage {
            sender_id: me.id,
            recipient_id: payload.to,
            content: MEAL_PHOTO_CONTENT.into(),
            image: Some(payload.image_base64.clone()),
        })
        .await?;

    let reply = coach_reply(&state, &me, &payload.image_base64).await;
    let ai_reply = state
        .messages
        .insert_message(&NewMessage {
            sender_id: bot_id,
            recipient_id: me.id,
            content: reply,
            image: None,
        })
        .await?;

    info!(user_id = %me.id, recipient_id = %payload.to, "meal photo answered");
    Ok((StatusCode::CREATED, Json(SendMealResponse { message, ai_reply })))
}
