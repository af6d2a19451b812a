use sqlx::SqliteExecutor;

use crate::models::UserRow;

const SQL_LOAD_USER_BY_USERNAME: &str = r#"
SELECT
  user_id,
  username,
  display_name,
  image_url
FROM users
WHERE username = ?
LIMIT 1
"#;

pub async fn load_user_by_username<'e>(
    executor: impl SqliteExecutor<'e>,
    username: &str,
) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(SQL_LOAD_USER_BY_USERNAME)
        .bind(username)
        .fetch_optional(executor)
        .await
}
