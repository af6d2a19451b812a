use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::services::host_gate_service::{authorize_host, Decision};
use crate::web::middleware::auth::MaybeUser;

/// Lets the request through only when the caller hosts the activity named by
/// the `id` path parameter.
pub async fn require_host(
    State(pool): State<SqlitePool>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(activity_id) = params.get("id") else {
        return AppError::NotFound("activity").into_response();
    };
    let caller = request
        .extensions()
        .get::<MaybeUser>()
        .and_then(|m| m.0.clone());

    match authorize_host(&pool, activity_id, caller.as_ref()).await {
        Ok(Decision::Allow) => next.run(request).await,
        Ok(Decision::Deny) if caller.is_none() => AppError::Unauthenticated.into_response(),
        Ok(Decision::Deny) => {
            tracing::info!(activity_id = %activity_id, "host-only command denied");
            AppError::Forbidden.into_response()
        }
        Err(e) => e.into_response(),
    }
}
