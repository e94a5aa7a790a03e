//! Router assembly

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::middleware::sign::{sign_middleware, Signer};
use crate::repository::Repository;
use crate::service::UserService;

/// Deadline applied to the database work of a single request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
pub struct AppState {
    pub repo: Arc<Repository>,
    pub users: UserService,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, users: UserService) -> Self {
        Self { repo, users }
    }
}

/// Build the application router. Everything under `/v1` requires a valid
/// request signature.
pub fn build_router(state: AppState, signer: Arc<Signer>) -> Router {
    let v1 = routes::users::router()
        .layer(middleware::from_fn_with_state(signer, sign_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}
