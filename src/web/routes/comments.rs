use axum::{
    extract::{Path, State},
    Json,
};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::services::comments_service::{self, CommentView};
use crate::web::middleware::auth::AuthenticatedUser;

pub async fn list_comments_handler(
    _auth_user: AuthenticatedUser,
    Path(activity_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    comments_service::list_comments(&pool, &activity_id)
        .await
        .map(Json)
}
