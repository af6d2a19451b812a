use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use http::header::{HeaderValue, CACHE_CONTROL};
use sqlx::SqlitePool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::services::chat_hub_service::ChatHub;

pub mod middleware;
pub mod routes;

use middleware::{auth, host};
use routes::{activities, chat_hub, comments, profiles};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub hub: Arc<ChatHub>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

pub fn app(state: AppState) -> Router {
    // Host-only commands pass the gate before their handler runs.
    let host_only = from_fn_with_state(state.pool.clone(), host::require_host);

    Router::new()
        .route(
            "/api/activities",
            get(activities::list_feed_handler).post(activities::create_activity_handler),
        )
        .route(
            "/api/activities/:id",
            get(activities::activity_detail_handler).merge(
                put(activities::edit_activity_handler)
                    .delete(activities::delete_activity_handler)
                    .route_layer(host_only),
            ),
        )
        .route(
            "/api/activities/:id/attend",
            post(activities::attend_handler).delete(activities::unattend_handler),
        )
        .route(
            "/api/activities/:id/comments",
            get(comments::list_comments_handler),
        )
        .route(
            "/api/profiles/:username/follow",
            post(profiles::follow_handler).delete(profiles::unfollow_handler),
        )
        .route("/hub/chat", get(chat_hub::chat_hub_handler))
        .layer(from_fn(auth::identify))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
