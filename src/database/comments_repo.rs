use sqlx::SqliteExecutor;

use crate::models::CommentRow;

pub struct NewComment<'a> {
    pub comment_id: &'a str,
    pub activity_id: &'a str,
    pub author_id: &'a str,
    pub body: &'a str,
    pub created_at: &'a str,
}

const SQL_INSERT_COMMENT: &str = r#"
INSERT INTO comments (
  comment_id,
  activity_id,
  author_id,
  body,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5)
"#;

pub async fn insert_comment<'e>(
    executor: impl SqliteExecutor<'e>,
    comment: NewComment<'_>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_INSERT_COMMENT)
        .bind(comment.comment_id)
        .bind(comment.activity_id)
        .bind(comment.author_id)
        .bind(comment.body)
        .bind(comment.created_at)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

const SQL_LOAD_COMMENT: &str = r#"
SELECT
  c.comment_id,
  c.activity_id,
  c.body,
  c.created_at,
  u.username,
  u.display_name,
  u.image_url
FROM comments c
JOIN users u ON u.user_id = c.author_id
WHERE c.comment_id = ?
LIMIT 1
"#;

pub async fn load_comment<'e>(
    executor: impl SqliteExecutor<'e>,
    comment_id: &str,
) -> sqlx::Result<Option<CommentRow>> {
    sqlx::query_as::<_, CommentRow>(SQL_LOAD_COMMENT)
        .bind(comment_id)
        .fetch_optional(executor)
        .await
}

// rowid is insertion order, which is also broadcast order.
const SQL_LIST_COMMENTS_FOR_ACTIVITY: &str = r#"
SELECT
  c.comment_id,
  c.activity_id,
  c.body,
  c.created_at,
  u.username,
  u.display_name,
  u.image_url
FROM comments c
JOIN users u ON u.user_id = c.author_id
WHERE c.activity_id = ?
ORDER BY c.rowid ASC
"#;

pub async fn list_comments_for_activity<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
) -> sqlx::Result<Vec<CommentRow>> {
    sqlx::query_as::<_, CommentRow>(SQL_LIST_COMMENTS_FOR_ACTIVITY)
        .bind(activity_id)
        .fetch_all(executor)
        .await
}
