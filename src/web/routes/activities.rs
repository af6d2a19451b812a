use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::services::activities_service::{
    self, ActivitiesEnvelope, ActivityPatch, ActivityView, FeedQuery, NewActivityInput,
};
use crate::web::middleware::auth::{AuthenticatedUser, MaybeUser};

pub async fn list_feed_handler(
    MaybeUser(caller): MaybeUser,
    Query(query): Query<FeedQuery>,
    State(pool): State<SqlitePool>,
) -> Result<Json<ActivitiesEnvelope>, AppError> {
    activities_service::list_feed(&pool, caller.as_ref(), &query)
        .await
        .map(Json)
}

pub async fn activity_detail_handler(
    MaybeUser(caller): MaybeUser,
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<Json<ActivityView>, AppError> {
    activities_service::load_activity(&pool, &activity_id, caller.as_ref())
        .await
        .map(Json)
}

pub async fn create_activity_handler(
    auth_user: AuthenticatedUser,
    State(pool): State<SqlitePool>,
    Json(input): Json<NewActivityInput>,
) -> Result<impl IntoResponse, AppError> {
    let view =
        activities_service::create_activity(&pool, &auth_user.identity, input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

// Routed behind `require_host`.
pub async fn edit_activity_handler(
    auth_user: AuthenticatedUser,
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
    Json(patch): Json<ActivityPatch>,
) -> Result<Json<ActivityView>, AppError> {
    activities_service::edit_activity(&pool, &activity_id, &auth_user.identity, patch, Utc::now())
        .await
        .map(Json)
}

// Routed behind `require_host`.
pub async fn delete_activity_handler(
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, AppError> {
    activities_service::delete_activity(&pool, &activity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn attend_handler(
    auth_user: AuthenticatedUser,
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, AppError> {
    activities_service::attend(&pool, &activity_id, &auth_user.identity, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unattend_handler(
    auth_user: AuthenticatedUser,
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, AppError> {
    activities_service::unattend(&pool, &activity_id, &auth_user.identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
