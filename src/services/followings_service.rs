use sqlx::SqlitePool;
use tracing::info;

use crate::database::{followings_repo, users_repo};
use crate::error::AppError;
use crate::models::UserRow;
use crate::services::identity_service::CallerIdentity;

pub async fn follow(
    pool: &SqlitePool,
    caller: &CallerIdentity,
    target_username: &str,
) -> Result<(), AppError> {
    let (observer, target) = load_pair(pool, caller, target_username).await?;
    if followings_repo::is_following(pool, &observer.user_id, &target.user_id).await? {
        return Err(AppError::validation("already following this user"));
    }
    store_following(pool, &observer, &target).await?;
    info!(observer = %caller, target = target_username, "following added");
    Ok(())
}

pub async fn unfollow(
    pool: &SqlitePool,
    caller: &CallerIdentity,
    target_username: &str,
) -> Result<(), AppError> {
    let (observer, target) = load_pair(pool, caller, target_username).await?;
    let removed = followings_repo::delete_following(pool, &observer.user_id, &target.user_id).await?;
    if removed == 0 {
        return Err(AppError::validation("not following this user"));
    }
    info!(observer = %caller, target = target_username, "following removed");
    Ok(())
}

// A concurrent follow of the same pair can pass the check above and lose
// on the primary key instead.
async fn store_following(
    pool: &SqlitePool,
    observer: &UserRow,
    target: &UserRow,
) -> Result<(), AppError> {
    match followings_repo::insert_following(pool, &observer.user_id, &target.user_id).await {
        Ok(()) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(AppError::validation("already following this user"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn load_pair(
    pool: &SqlitePool,
    caller: &CallerIdentity,
    target_username: &str,
) -> Result<(UserRow, UserRow), AppError> {
    if caller.as_str() == target_username {
        return Err(AppError::validation("cannot follow yourself"));
    }
    let Some(observer) = users_repo::load_user_by_username(pool, caller.as_str()).await? else {
        return Err(AppError::Unauthenticated);
    };
    let Some(target) = users_repo::load_user_by_username(pool, target_username).await? else {
        return Err(AppError::NotFound("user"));
    };
    Ok((observer, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, fixtures};

    #[tokio::test]
    async fn follow_then_unfollow() {
        let pool = database::connect_in_memory().await.unwrap();
        fixtures::user(&pool, "bob").await;
        fixtures::user(&pool, "tom").await;
        let bob = CallerIdentity::new("bob");

        follow(&pool, &bob, "tom").await.unwrap();
        assert!(matches!(
            follow(&pool, &bob, "tom").await.unwrap_err(),
            AppError::Validation(_)
        ));
        unfollow(&pool, &bob, "tom").await.unwrap();
        assert!(matches!(
            unfollow(&pool, &bob, "tom").await.unwrap_err(),
            AppError::Validation(_)
        ));

        assert!(matches!(
            follow(&pool, &bob, "bob").await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            follow(&pool, &bob, "nobody").await.unwrap_err(),
            AppError::NotFound("user")
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_validation_error() {
        let pool = database::connect_in_memory().await.unwrap();
        fixtures::user(&pool, "bob").await;
        fixtures::user(&pool, "tom").await;
        let (observer, target) = load_pair(&pool, &CallerIdentity::new("bob"), "tom")
            .await
            .unwrap();

        store_following(&pool, &observer, &target).await.unwrap();
        let err = store_following(&pool, &observer, &target).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
