//! User repository
//!
//! Rows live in the `users` table; profiles are cached as JSON under
//! `user:profile:<user_id>`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Ctx, RepoError, Repository};

/// How long a cached profile stays valid.
pub const PROFILE_TTL: Duration = Duration::from_secs(600);

/// User record from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub nickname: String,
    pub email: String,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds
    pub updated_at: i64,
}

pub struct UserRepository {
    repo: Arc<Repository>,
}

fn profile_key(user_id: &str) -> String {
    format!("user:profile:{user_id}")
}

impl UserRepository {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Insert `user`. A taken id or email is [`RepoError::Conflict`].
    pub async fn create(&self, ctx: &mut Ctx, user: &User) -> Result<(), RepoError> {
        let sql = self.repo.driver().bind_sql(
            r#"
            INSERT INTO users (user_id, nickname, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        );

        self.repo
            .db(ctx)
            .execute(
                sqlx::query(&sql)
                    .bind(user.user_id.clone())
                    .bind(user.nickname.clone())
                    .bind(user.email.clone())
                    .bind(user.created_at)
                    .bind(user.updated_at),
            )
            .await
            .map_err(|e| e.on_unique_violation("user"))?;

        Ok(())
    }

    pub async fn get_by_id(&self, ctx: &mut Ctx, user_id: &str) -> Result<User, RepoError> {
        let sql = self.repo.driver().bind_sql(
            r#"
            SELECT user_id, nickname, email, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        );

        self.repo
            .db(ctx)
            .fetch_optional(sqlx::query_as::<_, User>(&sql).bind(user_id.to_string()))
            .await?
            .ok_or_else(|| RepoError::NotFound {
                resource: "user",
                id: user_id.to_owned(),
            })
    }

    pub async fn get_by_email(&self, ctx: &mut Ctx, email: &str) -> Result<Option<User>, RepoError> {
        let sql = self.repo.driver().bind_sql(
            r#"
            SELECT user_id, nickname, email, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        );

        self.repo
            .db(ctx)
            .fetch_optional(sqlx::query_as::<_, User>(&sql).bind(email.to_string()))
            .await
    }

    /// Update nickname and timestamp. `NotFound` when no row matched.
    pub async fn update(&self, ctx: &mut Ctx, user: &User) -> Result<(), RepoError> {
        let sql = self.repo.driver().bind_sql(
            r#"
            UPDATE users
            SET nickname = $1, updated_at = $2
            WHERE user_id = $3
            "#,
        );

        let result = self
            .repo
            .db(ctx)
            .execute(
                sqlx::query(&sql)
                    .bind(user.nickname.clone())
                    .bind(user.updated_at)
                    .bind(user.user_id.clone()),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound {
                resource: "user",
                id: user.user_id.clone(),
            });
        }
        Ok(())
    }

    /// Cached profile, if present and decodable.
    pub async fn cached_profile(&self, user_id: &str) -> Result<Option<User>, RepoError> {
        let Some(raw) = self.repo.cache().get(&profile_key(user_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "discarding undecodable cached profile");
                Ok(None)
            }
        }
    }

    pub async fn cache_profile(&self, user: &User) -> Result<(), RepoError> {
        let Ok(raw) = serde_json::to_string(user) else {
            return Ok(());
        };
        self.repo
            .cache()
            .set(&profile_key(&user.user_id), &raw, PROFILE_TTL)
            .await?;
        Ok(())
    }

    pub async fn evict_profile(&self, user_id: &str) -> Result<(), RepoError> {
        self.repo.cache().delete(&profile_key(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::repository::new_db;
    use crate::server::migrate;
    use gatehouse_core::DbConfig;
    use tempfile::TempDir;

    async fn users() -> (TempDir, UserRepository) {
        let dir = tempfile::tempdir().unwrap();
        let conf = DbConfig {
            kind: "sqlite".into(),
            dsn: format!("sqlite://{}?mode=rwc", dir.path().join("users.db").display()),
            max_connections: 2,
        };
        let db = new_db(&conf).await.unwrap();
        migrate::run(&db).await.unwrap();
        let repo = Arc::new(Repository::new(db, Arc::new(MemoryCache::new())));
        (dir, UserRepository::new(repo))
    }

    fn alice() -> User {
        User {
            user_id: "u-1".into(),
            nickname: "alice".into(),
            email: "alice@example.com".into(),
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let (_dir, users) = users().await;
        let mut ctx = Ctx::background();
        users.create(&mut ctx, &alice()).await.unwrap();

        assert_eq!(users.get_by_id(&mut ctx, "u-1").await.unwrap(), alice());
        assert_eq!(
            users.get_by_email(&mut ctx, "alice@example.com").await.unwrap(),
            Some(alice())
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let (_dir, users) = users().await;
        let mut ctx = Ctx::background();
        users.create(&mut ctx, &alice()).await.unwrap();

        let twin = User {
            user_id: "u-2".into(),
            ..alice()
        };
        let err = users.create(&mut ctx, &twin).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict { resource: "user" }));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let (_dir, users) = users().await;
        let mut ctx = Ctx::background();
        let err = users.get_by_id(&mut ctx, "nope").await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound { resource: "user", .. }));
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let (_dir, users) = users().await;
        let mut ctx = Ctx::background();
        let err = users.update(&mut ctx, &alice()).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn profile_cache_round_trip() {
        let (_dir, users) = users().await;
        assert_eq!(users.cached_profile("u-1").await.unwrap(), None);

        users.cache_profile(&alice()).await.unwrap();
        assert_eq!(users.cached_profile("u-1").await.unwrap(), Some(alice()));

        users.evict_profile("u-1").await.unwrap();
        assert_eq!(users.cached_profile("u-1").await.unwrap(), None);
    }
}
