use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::services::followings_service;
use crate::web::middleware::auth::AuthenticatedUser;

pub async fn follow_handler(
    auth_user: AuthenticatedUser,
    Path(username): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, AppError> {
    followings_service::follow(&pool, &auth_user.identity, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_handler(
    auth_user: AuthenticatedUser,
    Path(username): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, AppError> {
    followings_service::unfollow(&pool, &auth_user.identity, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}
