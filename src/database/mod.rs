use std::str::FromStr;

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::config::Config;

pub mod activities_repo;
pub mod attendances_repo;
pub mod comments_repo;
pub mod followings_repo;
pub mod users_repo;

pub static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn connect(config: &Config) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;
    info!(url = %config.database_url, "database ready");
    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied. Every connection
/// to `sqlite::memory:` is its own database, so the pool never opens a second
/// one or recycles the first.
pub async fn connect_in_memory() -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use sqlx::SqlitePool;

    pub async fn user(pool: &SqlitePool, username: &str) -> String {
        let user_id = format!("u-{username}");
        sqlx::query("INSERT INTO users (user_id, username, display_name) VALUES (?1, ?2, ?3)")
            .bind(&user_id)
            .bind(username)
            .bind(username.to_uppercase())
            .execute(pool)
            .await
            .unwrap();
        user_id
    }

    pub async fn activity(pool: &SqlitePool, activity_id: &str, scheduled_at: &str) {
        sqlx::query(
            "INSERT INTO activities (activity_id, title, category, scheduled_at) VALUES (?1, ?2, 'drinks', ?3)",
        )
        .bind(activity_id)
        .bind(format!("Activity {activity_id}"))
        .bind(scheduled_at)
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn attend(pool: &SqlitePool, activity_id: &str, user_id: &str, is_host: bool) {
        sqlx::query("INSERT INTO attendances (activity_id, user_id, is_host) VALUES (?1, ?2, ?3)")
            .bind(activity_id)
            .bind(user_id)
            .bind(is_host as i64)
            .execute(pool)
            .await
            .unwrap();
    }

    pub async fn follow(pool: &SqlitePool, observer_id: &str, target_id: &str) {
        sqlx::query("INSERT INTO followings (observer_id, target_id) VALUES (?1, ?2)")
            .bind(observer_id)
            .bind(target_id)
            .execute(pool)
            .await
            .unwrap();
    }
}
