//! User endpoints (signed)
//!
//! - `POST /users` register
//! - `GET /users/{user_id}` profile
//! - `PUT /users/{user_id}` update nickname

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::http::extractors::{UserId, ValidJson};
use crate::http::server::REQUEST_TIMEOUT;
use crate::http::{ok, ApiError, AppState, Envelope};
use crate::repository::{Ctx, User};
use crate::service::{RegisterRequest, UpdateProfileRequest};

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<User> {
    let mut ctx = Ctx::with_timeout(REQUEST_TIMEOUT);
    let user = state.users.register(&mut ctx, req).await?;
    Ok(ok(user))
}

async fn profile(State(state): State<Arc<AppState>>, UserId(user_id): UserId) -> ApiResult<User> {
    let mut ctx = Ctx::with_timeout(REQUEST_TIMEOUT);
    let user = state.users.profile(&mut ctx, &user_id).await?;
    Ok(ok(user))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<User> {
    let mut ctx = Ctx::with_timeout(REQUEST_TIMEOUT);
    let user = state.users.update_profile(&mut ctx, &user_id, req).await?;
    Ok(ok(user))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register))
        .route("/users/{user_id}", get(profile).put(update_profile))
}
