#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use activity_hub::database;
use activity_hub::services::chat_hub_service::ChatHub;
use activity_hub::web::{self, AppState};

pub struct TestApp {
    pub pool: SqlitePool,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = database::connect_in_memory().await.unwrap();
        let state = AppState {
            pool: pool.clone(),
            hub: Arc::new(ChatHub::new(Duration::from_secs(5))),
        };
        Self {
            router: web::app(state.clone()),
            state,
            pool,
        }
    }

    pub async fn user(&self, username: &str) -> String {
        let user_id = format!("u-{username}");
        sqlx::query("INSERT INTO users (user_id, username, display_name) VALUES (?1, ?2, ?3)")
            .bind(&user_id)
            .bind(username)
            .bind(username)
            .execute(&self.pool)
            .await
            .unwrap();
        user_id
    }

    pub async fn activity(&self, activity_id: &str, scheduled_at: &str, host_id: &str) {
        sqlx::query(
            "INSERT INTO activities (activity_id, title, category, scheduled_at) VALUES (?1, 'Meetup', 'social', ?2)",
        )
        .bind(activity_id)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await
        .unwrap();
        self.attend(activity_id, host_id, true).await;
    }

    pub async fn attend(&self, activity_id: &str, user_id: &str, is_host: bool) {
        sqlx::query("INSERT INTO attendances (activity_id, user_id, is_host) VALUES (?1, ?2, ?3)")
            .bind(activity_id)
            .bind(user_id)
            .bind(is_host as i64)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        as_user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(username) = as_user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(username)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn token_for(username: &str) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::json!({ "nameid": username, "unique_name": username }).to_string());
    format!("{header}.{payload}.sig")
}

/// RFC 3339 timestamp `days` from now, whole seconds.
pub fn days_from_now(days: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::days(days))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
