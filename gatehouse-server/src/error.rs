//! Error types for gatehouse-server startup

use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::repository::Driver;

/// Startup failures. The binary never runs in a degraded state: every one of
/// these ends in [`crate::wire::fail_fast`].
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("{0} error: unsupported database type")]
    UnsupportedDatabase(String),

    #[error("database dsn does not use the '{driver}' scheme")]
    DsnMismatch { driver: Driver },

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("redis error: {0}")]
    Cache(#[from] CacheError),

    #[error("redis error: no reply within {0:?}")]
    CacheTimeout(Duration),

    #[error("invalid listen address: {0}")]
    ListenAddr(String),
}
