use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AnalyzeImageRequest, AnalyzeImageResponse, CreateMetricRequest, LatestWithPrevious,
        UpdateNoteRequest,
    },
    repo_types::{BodyMetric, NewBodyMetric},
    services::scan_prompt,
};
use crate::{
    ai::{generate_with_fallback, GenerateRequest, InlineImage},
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    groups::repo_types::Capability,
    state::AppState,
};

pub fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/api/body-metrics", post(create_metric))
        .route("/api/body-metrics/latest-with-previous", get(latest_with_previous))
        .route("/api/body-metrics/all", get(list_own))
        .route("/api/body-metrics/user/:user_id", get(list_for_user))
        .route("/api/body-metrics/:id/note", put(update_note))
        .route("/api/body-metrics/analyze-image", post(analyze_image))
}

#[instrument(skip(state, payload, user))]
pub async fn create_metric(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<CreateMetricRequest>,
) -> AppResult<(StatusCode, Json<BodyMetric>)> {
    let metric = state
        .metrics
        .insert_metric(
            user.id,
            &NewBodyMetric {
                measured_on: payload.measured_on,
                measurements: payload.measurements,
                analysis: payload.analysis,
                note: payload.note,
            },
        )
        .await?;
    info!(user_id = %user.id, metric_id = %metric.id, "body metric recorded");
    Ok((StatusCode::CREATED, Json(metric)))
}

#[instrument(skip(state, user))]
pub async fn latest_with_previous(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<LatestWithPrevious>> {
    let mut recent = state.metrics.latest_metrics(user.id, 2).await?.into_iter();
    Ok(Json(LatestWithPrevious {
        latest: recent.next(),
        previous: recent.next(),
    }))
}

#[instrument(skip(state, user))]
pub async fn list_own(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<BodyMetric>>> {
    Ok(Json(state.metrics.list_metrics(user.id).await?))
}

#[instrument(skip(state, caller))]
pub async fn list_for_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    AppPath(user_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<BodyMetric>>> {
    if caller.id != user_id && !caller.can(Capability::Annotate) {
        warn!(caller_id = %caller.id, %user_id, "metrics of another user refused");
        return Err(AppError::Forbidden("You may not view this user's metrics".into()));
    }
    Ok(Json(state.metrics.list_metrics(user_id).await?))
}

#[instrument(skip(state, payload, caller))]
pub async fn update_note(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateNoteRequest>,
) -> AppResult<Json<BodyMetric>> {
    let metric = state
        .metrics
        .find_metric(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Metric not found".into()))?;

    if metric.user_id != caller.id && !caller.can(Capability::Annotate) {
        warn!(caller_id = %caller.id, metric_id = %id, "note edit refused");
        return Err(AppError::Forbidden("You may not annotate this metric".into()));
    }

    let updated = state
        .metrics
        .update_note(id, payload.note.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("Metric not found".into()))?;
    info!(caller_id = %caller.id, metric_id = %id, "metric note updated");
    Ok(Json(updated))
}

/// POST /api/body-metrics/analyze-image
#[instrument(skip(state, payload, user))]
pub async fn analyze_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<AnalyzeImageRequest>,
) -> AppResult<Json<AnalyzeImageResponse>> {
    if payload.image_base64.trim().is_empty() {
        return Err(AppError::BadRequest("image_base64 is required".into()));
    }

    let request = GenerateRequest {
        prompt: scan_prompt(&payload),
        image: Some(InlineImage::from_client_payload(&payload.image_base64)),
    };
    let generated = generate_with_fallback(state.ai.as_ref(), &state.config.ai.models, &request)
        .await
        .map_err(|e| {
            error!(user_id = %user.id, error = %e, "scan analysis failed");
            AppError::AiUnavailable
        })?;

    info!(user_id = %user.id, model = %generated.model, "scan analysed");
    Ok(Json(AnalyzeImageResponse {
        model: generated.model,
        text: generated.text,
    }))
}
