use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::database::activities_repo;
use crate::error::AppError;
use crate::services::identity_service::CallerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// May `caller` run host-only commands on `activity_id`?
///
/// A missing identity is a `Deny` before anything is read. An unknown
/// activity is `AppError::NotFound`, kept apart from `Deny` so the routing
/// layer can answer 404 rather than 403. Store errors propagate unchanged.
pub async fn authorize_host(
    pool: &SqlitePool,
    activity_id: &str,
    caller: Option<&CallerIdentity>,
) -> Result<Decision, AppError> {
    let Some(caller) = caller else {
        return Ok(Decision::Deny);
    };

    let Some(lookup) = activities_repo::lookup_host(pool, activity_id).await? else {
        return Err(AppError::NotFound("activity"));
    };

    let Some(host) = lookup.host_username else {
        warn!(activity_id, "activity has no host attendance");
        return Ok(Decision::Deny);
    };

    let decision = if host == caller.as_str() {
        Decision::Allow
    } else {
        Decision::Deny
    };
    debug!(activity_id, caller = %caller, ?decision, "host check");
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, fixtures};

    async fn seeded() -> SqlitePool {
        let pool = database::connect_in_memory().await.unwrap();
        let u1 = fixtures::user(&pool, "u1").await;
        let u2 = fixtures::user(&pool, "u2").await;
        fixtures::activity(&pool, "a", "2030-01-01T10:00:00Z").await;
        fixtures::attend(&pool, "a", &u1, true).await;
        fixtures::attend(&pool, "a", &u2, false).await;
        fixtures::activity(&pool, "orphan", "2030-01-01T10:00:00Z").await;
        pool
    }

    #[tokio::test]
    async fn only_the_host_is_allowed() {
        let pool = seeded().await;
        let u1 = CallerIdentity::new("u1");
        let u2 = CallerIdentity::new("u2");
        let stranger = CallerIdentity::new("nobody");

        assert_eq!(
            authorize_host(&pool, "a", Some(&u1)).await.unwrap(),
            Decision::Allow
        );
        assert_eq!(
            authorize_host(&pool, "a", Some(&u2)).await.unwrap(),
            Decision::Deny
        );
        assert_eq!(
            authorize_host(&pool, "a", Some(&stranger)).await.unwrap(),
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn unknown_activity_is_not_found() {
        let pool = seeded().await;
        let err = authorize_host(&pool, "unknown-id", Some(&CallerIdentity::new("u1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("activity")));
    }

    #[tokio::test]
    async fn missing_identity_and_hostless_activity_deny() {
        let pool = seeded().await;
        assert_eq!(
            authorize_host(&pool, "a", None).await.unwrap(),
            Decision::Deny
        );
        assert_eq!(
            authorize_host(&pool, "orphan", Some(&CallerIdentity::new("u1")))
                .await
                .unwrap(),
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn second_host_is_rejected_by_the_store() {
        let pool = seeded().await;
        let res = sqlx::query("UPDATE attendances SET is_host = 1 WHERE user_id = 'u-u2'")
            .execute(&pool)
            .await;
        assert!(res.is_err());
    }
}
