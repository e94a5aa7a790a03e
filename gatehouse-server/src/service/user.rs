//! User service - registration, profile reads and updates

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::ServiceError;
use crate::repository::{Ctx, RepoError, Repository, Transaction, User, UserRepository};

const MAX_NICKNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub nickname: String,
}

pub struct UserService<X = Repository> {
    tx: Arc<X>,
    users: Arc<UserRepository>,
}

impl<X: Transaction> UserService<X> {
    pub fn new(tx: Arc<X>, users: Arc<UserRepository>) -> Self {
        Self { tx, users }
    }

    /// Create a user. The email check and the insert share one transaction.
    pub async fn register(&self, ctx: &mut Ctx, req: RegisterRequest) -> Result<User, ServiceError> {
        let email = req.email.trim().to_lowercase();
        validate_email(&email)?;
        let nickname = validate_nickname(&req.nickname)?;

        let now = Utc::now().timestamp_millis();
        let user = User {
            user_id: Uuid::new_v4().simple().to_string(),
            nickname,
            email,
            created_at: now,
            updated_at: now,
        };

        let users = Arc::clone(&self.users);
        let user = self
            .tx
            .transaction(ctx, move |ctx| {
                Box::pin(async move {
                    if users.get_by_email(ctx, &user.email).await?.is_some() {
                        return Err(ServiceError::EmailInUse);
                    }
                    // A concurrent registration can commit between the check and
                    // the insert; the unique index catches it.
                    users.create(ctx, &user).await.map_err(|e| match e {
                        RepoError::Conflict { .. } => ServiceError::EmailInUse,
                        other => other.into(),
                    })?;
                    Ok(user)
                })
            })
            .await?;

        tracing::info!(user_id = %user.user_id, "user registered");
        Ok(user)
    }

    /// Read a profile, cache-aside. Cache failures fall back to the database.
    pub async fn profile(&self, ctx: &mut Ctx, user_id: &str) -> Result<User, ServiceError> {
        match self.users.cached_profile(user_id).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "profile cache read failed"),
        }

        let user = self.users.get_by_id(ctx, user_id).await?;
        if let Err(e) = self.users.cache_profile(&user).await {
            tracing::warn!(user_id, error = %e, "profile cache write failed");
        }
        Ok(user)
    }

    /// Change the nickname and drop the cached profile.
    pub async fn update_profile(
        &self,
        ctx: &mut Ctx,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<User, ServiceError> {
        let nickname = validate_nickname(&req.nickname)?;
        let users = Arc::clone(&self.users);
        let user_id_owned = user_id.to_string();

        let user = self
            .tx
            .transaction(ctx, move |ctx| {
                Box::pin(async move {
                    let mut user = users.get_by_id(ctx, &user_id_owned).await?;
                    user.nickname = nickname;
                    user.updated_at = Utc::now().timestamp_millis();
                    users.update(ctx, &user).await?;
                    Ok::<_, ServiceError>(user)
                })
            })
            .await?;

        if let Err(e) = self.users.evict_profile(user_id).await {
            tracing::warn!(user_id, error = %e, "profile cache eviction failed");
        }
        Ok(user)
    }
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));

    if !well_formed || email.len() > MAX_EMAIL_LEN {
        return Err(ServiceError::Invalid {
            field: "email",
            reason: "must be an address like name@example.com",
        });
    }
    Ok(())
}

fn validate_nickname(nickname: &str) -> Result<String, ServiceError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ServiceError::Invalid {
            field: "nickname",
            reason: "cannot be empty",
        });
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ServiceError::Invalid {
            field: "nickname",
            reason: "exceeds 64 characters",
        });
    }
    Ok(nickname.to_string())
}
