use sqlx::SqliteExecutor;

const SQL_IS_FOLLOWING: &str = r#"
SELECT EXISTS (
  SELECT 1
  FROM followings
  WHERE observer_id = ?1
    AND target_id = ?2
)
"#;

pub async fn is_following<'e>(
    executor: impl SqliteExecutor<'e>,
    observer_id: &str,
    target_id: &str,
) -> sqlx::Result<bool> {
    let exists = sqlx::query_scalar::<_, i64>(SQL_IS_FOLLOWING)
        .bind(observer_id)
        .bind(target_id)
        .fetch_one(executor)
        .await?;
    Ok(exists == 1)
}

const SQL_INSERT_FOLLOWING: &str = r#"
INSERT INTO followings (
  observer_id,
  target_id
) VALUES (?1, ?2)
"#;

pub async fn insert_following<'e>(
    executor: impl SqliteExecutor<'e>,
    observer_id: &str,
    target_id: &str,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_FOLLOWING)
        .bind(observer_id)
        .bind(target_id)
        .execute(executor)
        .await?;
    Ok(())
}

const SQL_DELETE_FOLLOWING: &str = r#"
DELETE FROM followings
WHERE observer_id = ?1
  AND target_id = ?2
"#;

pub async fn delete_following<'e>(
    executor: impl SqliteExecutor<'e>,
    observer_id: &str,
    target_id: &str,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_DELETE_FOLLOWING)
        .bind(observer_id)
        .bind(target_id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}
