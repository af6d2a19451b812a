use sqlx::SqliteExecutor;

use crate::models::{ActivityRow, HostLookupRow};

// ?1 start cutoff, ?2 filter mode (all|going|hosting), ?3 caller username.
// Dates compare as UTC text with millisecond precision.
const SQL_LIST_FEED_PAGE: &str = r#"
SELECT
  a.activity_id,
  a.title,
  a.description,
  a.category,
  a.scheduled_at,
  a.city,
  a.venue,
  a.latitude,
  a.longitude
FROM activities a
WHERE strftime('%Y-%m-%dT%H:%M:%f', a.scheduled_at) >= strftime('%Y-%m-%dT%H:%M:%f', ?1)
  AND (
    ?2 = 'all'
    OR (
      ?2 = 'going'
      AND EXISTS (
        SELECT 1
        FROM attendances att
        JOIN users u ON u.user_id = att.user_id
        WHERE att.activity_id = a.activity_id
          AND u.username = ?3
      )
    )
    OR (
      ?2 = 'hosting'
      AND EXISTS (
        SELECT 1
        FROM attendances att
        JOIN users u ON u.user_id = att.user_id
        WHERE att.activity_id = a.activity_id
          AND att.is_host = 1
          AND u.username = ?3
      )
    )
  )
ORDER BY strftime('%Y-%m-%dT%H:%M:%f', a.scheduled_at) ASC, a.activity_id ASC
LIMIT ?4 OFFSET ?5
"#;

pub struct FeedFilterParams<'a> {
    pub start_at: &'a str,
    pub mode: &'a str, // all|going|hosting
    pub caller_username: Option<&'a str>,
}

pub async fn list_feed_page<'e>(
    executor: impl SqliteExecutor<'e>,
    filter: &FeedFilterParams<'_>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<ActivityRow>> {
    sqlx::query_as::<_, ActivityRow>(SQL_LIST_FEED_PAGE)
        .bind(filter.start_at)
        .bind(filter.mode)
        .bind(filter.caller_username)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
}

const SQL_COUNT_FEED: &str = r#"
SELECT COUNT(*)
FROM activities a
WHERE strftime('%Y-%m-%dT%H:%M:%f', a.scheduled_at) >= strftime('%Y-%m-%dT%H:%M:%f', ?1)
  AND (
    ?2 = 'all'
    OR (
      ?2 = 'going'
      AND EXISTS (
        SELECT 1
        FROM attendances att
        JOIN users u ON u.user_id = att.user_id
        WHERE att.activity_id = a.activity_id
          AND u.username = ?3
      )
    )
    OR (
      ?2 = 'hosting'
      AND EXISTS (
        SELECT 1
        FROM attendances att
        JOIN users u ON u.user_id = att.user_id
        WHERE att.activity_id = a.activity_id
          AND att.is_host = 1
          AND u.username = ?3
      )
    )
  )
"#;

pub async fn count_feed<'e>(
    executor: impl SqliteExecutor<'e>,
    filter: &FeedFilterParams<'_>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(SQL_COUNT_FEED)
        .bind(filter.start_at)
        .bind(filter.mode)
        .bind(filter.caller_username)
        .fetch_one(executor)
        .await
}

const SQL_LOAD_ACTIVITY_BY_ID: &str = r#"
SELECT
  activity_id,
  title,
  description,
  category,
  scheduled_at,
  city,
  venue,
  latitude,
  longitude
FROM activities
WHERE activity_id = ?
LIMIT 1
"#;

pub async fn load_activity_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
) -> sqlx::Result<Option<ActivityRow>> {
    sqlx::query_as::<_, ActivityRow>(SQL_LOAD_ACTIVITY_BY_ID)
        .bind(activity_id)
        .fetch_optional(executor)
        .await
}

// Served by ux_attendances_single_host.
const SQL_LOOKUP_HOST: &str = r#"
SELECT
  a.activity_id,
  (
    SELECT u.username
    FROM attendances att
    JOIN users u ON u.user_id = att.user_id
    WHERE att.activity_id = a.activity_id
      AND att.is_host = 1
    LIMIT 1
  ) AS host_username
FROM activities a
WHERE a.activity_id = ?
LIMIT 1
"#;

pub async fn lookup_host<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
) -> sqlx::Result<Option<HostLookupRow>> {
    sqlx::query_as::<_, HostLookupRow>(SQL_LOOKUP_HOST)
        .bind(activity_id)
        .fetch_optional(executor)
        .await
}

const SQL_INSERT_ACTIVITY: &str = r#"
INSERT INTO activities (
  activity_id,
  title,
  description,
  category,
  scheduled_at,
  city,
  venue,
  latitude,
  longitude
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub async fn insert_activity<'e>(
    executor: impl SqliteExecutor<'e>,
    row: &ActivityRow,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_INSERT_ACTIVITY)
        .bind(&row.activity_id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.category)
        .bind(&row.scheduled_at)
        .bind(&row.city)
        .bind(&row.venue)
        .bind(row.latitude)
        .bind(row.longitude)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

const SQL_UPDATE_ACTIVITY: &str = r#"
UPDATE activities
SET title = ?,
    description = ?,
    category = ?,
    scheduled_at = ?,
    city = ?,
    venue = ?,
    latitude = ?,
    longitude = ?
WHERE activity_id = ?
"#;

pub async fn update_activity<'e>(
    executor: impl SqliteExecutor<'e>,
    row: &ActivityRow,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_ACTIVITY)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.category)
        .bind(&row.scheduled_at)
        .bind(&row.city)
        .bind(&row.venue)
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(&row.activity_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

// Attendances and comments go with it (ON DELETE CASCADE).
const SQL_DELETE_ACTIVITY: &str = r#"
DELETE FROM activities
WHERE activity_id = ?
"#;

pub async fn delete_activity<'e>(
    executor: impl SqliteExecutor<'e>,
    activity_id: &str,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_DELETE_ACTIVITY)
        .bind(activity_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}
