//! Health endpoints
//!
//! `/health` answers as long as the process is up; `/health/ready` also
//! round-trips the database and the cache.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::http::AppState;
use crate::repository::Ctx;

const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub database: bool,
    pub cache: bool,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/ready
async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let mut ctx = Ctx::with_timeout(READY_TIMEOUT);
    let database = state
        .repo
        .db(&mut ctx)
        .execute_raw("SELECT 1")
        .await
        .map_err(|e| tracing::warn!(error = %e, "readiness: database check failed"))
        .is_ok();

    let cache = tokio::time::timeout(READY_TIMEOUT, state.repo.cache().ping())
        .await
        .map_err(|_| tracing::warn!("readiness: cache ping timed out"))
        .and_then(|r| r.map_err(|e| tracing::warn!(error = %e, "readiness: cache ping failed")))
        .is_ok();

    let status = if database && cache {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { database, cache }))
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
