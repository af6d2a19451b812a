use sqlx::SqliteExecutor;

use crate::models::{AttendanceRow, AttendeeRow};

// ?2 is the caller's username; NULL yields is_following = 0 for everyone.
const SQL_LIST_ATTENDEES: &str = r#"
SELECT
  u.username,
  u.display_name,
  u.image_url,
  att.is_host,
  EXISTS (
    SELECT 1
    FROM followings f
    JOIN users o ON o.user_id = f.observer_id
    WHERE o.username = ?2
      AND f.target_id = att.user_id
  ) AS is_following
FROM attendances att
JOIN users u ON u.user_id = att.user_id
WHERE att.activity_id = ?1
ORDER BY att.is_host DESC, att.joined_at ASC, u.username ASC
"#;

pub async fn list_attendees<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
    caller_username: Option<&str>,
) -> sqlx::Result<Vec<AttendeeRow>> {
    sqlx::query_as::<_, AttendeeRow>(SQL_LIST_ATTENDEES)
        .bind(activity_id)
        .bind(caller_username)
        .fetch_all(executor)
        .await
}

const SQL_LOAD_ATTENDANCE: &str = r#"
SELECT
  activity_id,
  user_id,
  is_host,
  joined_at
FROM attendances
WHERE activity_id = ?
  AND user_id = ?
LIMIT 1
"#;

pub async fn load_attendance<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
    user_id: &str,
) -> sqlx::Result<Option<AttendanceRow>> {
    sqlx::query_as::<_, AttendanceRow>(SQL_LOAD_ATTENDANCE)
        .bind(activity_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

const SQL_INSERT_ATTENDANCE: &str = r#"
INSERT INTO attendances (
  activity_id,
  user_id,
  is_host,
  joined_at
) VALUES (?, ?, ?, ?)
"#;

pub struct NewAttendance<'a> {
    pub activity_id: &'a str,
    pub user_id: &'a str,
    pub is_host: bool,
    pub joined_at: &'a str,
}

pub async fn insert_attendance<'e>(
    executor: impl SqliteExecutor<'e>,
    attendance: NewAttendance<'_>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_INSERT_ATTENDANCE)
        .bind(attendance.activity_id)
        .bind(attendance.user_id)
        .bind(attendance.is_host as i64)
        .bind(attendance.joined_at)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

const SQL_DELETE_ATTENDANCE: &str = r#"
DELETE FROM attendances
WHERE activity_id = ?
  AND user_id = ?
  AND is_host = 0
"#;

pub async fn delete_guest_attendance<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
    user_id: &str,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_DELETE_ATTENDANCE)
        .bind(activity_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}
