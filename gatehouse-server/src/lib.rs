//! gatehouse-server: signed HTTP edge over a transactional repository
//!
//! Startup is wired in [`wire`]: database, cache, repository, services and
//! router are built once, then handed to an [`App`] which runs its servers
//! until they finish or the process is asked to stop.

pub mod app;
pub mod cache;
pub mod error;
pub mod http;
pub mod middleware;
pub mod repository;
pub mod server;
pub mod service;
pub mod wire;

pub use app::{App, Server, ServerError};
pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use error::StartupError;
pub use repository::{Ctx, RepoError, Repository, Transaction};
