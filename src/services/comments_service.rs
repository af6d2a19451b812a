use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::database::comments_repo::{self, NewComment};
use crate::database::{activities_repo, users_repo};
use crate::error::AppError;
use crate::models::CommentRow;
use crate::services::identity_service::CallerIdentity;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub activity_id: String,
    pub body: String,
    pub created_at: String,
    pub username: String,
    pub display_name: String,
    pub image: Option<String>,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.comment_id,
            activity_id: row.activity_id,
            body: row.body,
            created_at: row.created_at,
            username: row.username,
            display_name: row.display_name,
            image: row.image_url,
        }
    }
}

/// Stores a comment authored by `author` and returns it as persisted.
pub async fn create_comment(
    pool: &SqlitePool,
    author: &CallerIdentity,
    activity_id: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<CommentView, AppError> {
    let mut tx = pool.begin().await?;
    let comment = stage_comment(&mut tx, author, activity_id, body, now).await?;
    tx.commit().await?;
    Ok(comment)
}

/// Runs every statement of a comment insert inside the caller's transaction.
/// Nothing is visible to other connections until that transaction commits.
pub async fn stage_comment(
    tx: &mut SqliteConnection,
    author: &CallerIdentity,
    activity_id: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<CommentView, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::validation("comment body is required"));
    }

    if activities_repo::load_activity_by_id(&mut *tx, activity_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("activity"));
    }
    let Some(user) = users_repo::load_user_by_username(&mut *tx, author.as_str()).await? else {
        return Err(AppError::Unauthenticated);
    };

    let comment_id = Uuid::new_v4().to_string();
    let created_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    comments_repo::insert_comment(
        &mut *tx,
        NewComment {
            comment_id: &comment_id,
            activity_id,
            author_id: &user.user_id,
            body,
            created_at: &created_at,
        },
    )
    .await?;

    let Some(row) = comments_repo::load_comment(&mut *tx, &comment_id).await? else {
        return Err(AppError::NotFound("comment"));
    };
    Ok(row.into())
}

pub async fn list_comments(
    pool: &SqlitePool,
    activity_id: &str,
) -> Result<Vec<CommentView>, AppError> {
    if activities_repo::load_activity_by_id(pool, activity_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("activity"));
    }
    let rows = comments_repo::list_comments_for_activity(pool, activity_id).await?;
    Ok(rows.into_iter().map(CommentView::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, fixtures};

    async fn seeded() -> SqlitePool {
        let pool = database::connect_in_memory().await.unwrap();
        fixtures::user(&pool, "bob").await;
        fixtures::activity(&pool, "a", "2030-01-01T10:00:00Z").await;
        pool
    }

    #[tokio::test]
    async fn comments_list_in_creation_order() {
        let pool = seeded().await;
        let bob = CallerIdentity::new("bob");
        let at = Utc::now();

        let first = create_comment(&pool, &bob, "a", " hello ", at).await.unwrap();
        create_comment(&pool, &bob, "a", "second", at).await.unwrap();

        assert_eq!(first.body, "hello");
        assert_eq!(first.username, "bob");
        assert_eq!(first.display_name, "BOB");

        let listed = list_comments(&pool, "a").await.unwrap();
        let bodies: Vec<&str> = listed.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["hello", "second"]);
    }

    #[tokio::test]
    async fn rejects_blank_body_unknown_activity_and_unknown_author() {
        let pool = seeded().await;
        let bob = CallerIdentity::new("bob");

        let err = create_comment(&pool, &bob, "a", "   ", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_comment(&pool, &bob, "nope", "hi", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("activity")));

        let err = create_comment(&pool, &CallerIdentity::new("ghost"), "a", "hi", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
