//! Startup wiring
//!
//! Construction order is fixed: database, then cache, then everything that
//! depends on them. Any failure is a [`StartupError`]; the binary passes it
//! through [`fail_fast`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use gatehouse_core::{Config, HttpConfig, SecurityConfig};

use crate::app::App;
use crate::cache::new_redis;
use crate::error::StartupError;
use crate::http::{build_router, AppState};
use crate::middleware::Signer;
use crate::repository::{new_db, Repository, UserRepository};
use crate::server::{HttpServer, Migrate};
use crate::service::UserService;

/// The `server` app: signed HTTP API over database and cache.
pub async fn new_server_app(conf: &Config) -> Result<App, StartupError> {
    let db = new_db(&conf.data.db).await?;
    let cache = new_redis(&conf.data.redis).await?;
    let repo = Arc::new(Repository::new(db, Arc::new(cache)));

    let addr = listen_addr(&conf.http).await?;
    let router = new_router(&conf.security, repo);
    tracing::info!(%addr, "server app wired");

    Ok(App::new("server").with_server(HttpServer::new(addr, router)))
}

/// The `migrate` app: database only, finishes once the schema is applied.
pub async fn new_migrate_app(conf: &Config) -> Result<App, StartupError> {
    let db = new_db(&conf.data.db).await?;
    Ok(App::new("migrate").with_server(Migrate::new(db)))
}

/// Services and routes over an existing repository.
pub fn new_router(security: &SecurityConfig, repo: Arc<Repository>) -> Router {
    let users = Arc::new(UserRepository::new(Arc::clone(&repo)));
    let service = UserService::new(Arc::clone(&repo), users);
    let signer = Arc::new(Signer::new(&security.api_sign));
    build_router(AppState::new(repo, service), signer)
}

/// Resolve `[http] host:port`, taking the first address.
pub async fn listen_addr(conf: &HttpConfig) -> Result<SocketAddr, StartupError> {
    let target = format!("{}:{}", conf.host, conf.port);
    tokio::net::lookup_host(target.clone())
        .await
        .map_err(|e| StartupError::ListenAddr(format!("{target}: {e}")))?
        .next()
        .ok_or(StartupError::ListenAddr(target))
}

/// Unwrap a startup result or log it and exit with status 1.
pub fn fail_fast<T>(result: Result<T, StartupError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
