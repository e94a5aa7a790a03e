//! Repository layer - database pool, cache handle and transactions
//!
//! # Transactions
//!
//! There is no ambient transaction state. A caller opens a unit of work with
//! [`Repository::transaction`], which hands the callback a derived [`Ctx`]
//! carrying the transaction. Any [`Repository::db`] call made with that
//! context runs on the same connection, so repositories compose into one
//! atomic operation without passing a transaction object around.
//!
//! A `transaction` call on a context that already carries a transaction
//! opens a savepoint instead of a new connection.

pub mod context;
pub mod db;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::any::AnyPoolOptions;

use gatehouse_core::DbConfig;

use crate::cache::{CacheError, CacheStore};
use crate::error::StartupError;

pub use context::Ctx;
pub use db::{Database, Db, Driver};
pub use user::{User, UserRepository};

use db::bounded;

/// Repository error type
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// A unique constraint rejected the write.
    #[error("conflict: {resource} already exists")]
    Conflict { resource: &'static str },
}

impl RepoError {
    /// Turn a unique-constraint violation into [`RepoError::Conflict`].
    pub(crate) fn on_unique_violation(self, resource: &'static str) -> Self {
        match self {
            Self::Sqlx(sqlx::Error::Database(ref e)) if e.is_unique_violation() => {
                Self::Conflict { resource }
            }
            other => other,
        }
    }
}

/// Shared database and cache access. One per process.
pub struct Repository {
    db: Database,
    cache: Arc<dyn CacheStore>,
}

impl Repository {
    pub fn new(db: Database, cache: Arc<dyn CacheStore>) -> Self {
        Self { db, cache }
    }

    /// Database handle for `ctx`: the bound transaction if there is one,
    /// otherwise the pool.
    pub fn db<'a>(&'a self, ctx: &'a mut Ctx) -> Db<'a> {
        self.db.handle(ctx)
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn driver(&self) -> Driver {
        self.db.driver
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Returns `f`'s
    /// error or the commit error unchanged. Nested calls use savepoints on
    /// the already-bound transaction.
    pub async fn transaction<T, E, F>(&self, ctx: &mut Ctx, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Ctx) -> BoxFuture<'c, Result<T, E>>,
        E: From<RepoError>,
    {
        if ctx.in_transaction() {
            return self.savepoint(ctx, f).await;
        }

        let tx = bounded(ctx.deadline(), self.db.pool.begin()).await?;
        let mut scoped = ctx.derive(tx);
        tracing::trace!("transaction begin");

        let result = f(&mut scoped).await;
        let Some(tx) = scoped.tx.take() else {
            return result;
        };

        match result {
            Ok(value) => {
                tx.commit().await.map_err(RepoError::from)?;
                tracing::trace!("transaction commit");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "transaction rollback failed");
                } else {
                    tracing::trace!("transaction rollback");
                }
                Err(err)
            }
        }
    }

    async fn savepoint<T, E, F>(&self, ctx: &mut Ctx, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Ctx) -> BoxFuture<'c, Result<T, E>>,
        E: From<RepoError>,
    {
        let name = format!("sp_{}", ctx.savepoints + 1);
        self.db(ctx)
            .execute_raw(&format!("SAVEPOINT {name}"))
            .await?;
        ctx.savepoints += 1;

        let result = f(ctx).await;

        let closing = match &result {
            Ok(_) => format!("RELEASE SAVEPOINT {name}"),
            Err(_) => format!("ROLLBACK TO SAVEPOINT {name}"),
        };
        let closed = self.db(ctx).execute_raw(&closing).await;
        ctx.savepoints -= 1;

        match (result, closed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(rollback)) => {
                tracing::warn!(savepoint = %name, error = %rollback, "savepoint rollback failed");
                Err(err)
            }
        }
    }
}

/// Transaction capability, for services that should not see the rest of
/// the repository.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn transaction<T, E, F>(&self, ctx: &mut Ctx, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepoError> + Send,
        F: for<'c> FnOnce(&'c mut Ctx) -> BoxFuture<'c, Result<T, E>> + Send;
}

#[async_trait]
impl Transaction for Repository {
    async fn transaction<T, E, F>(&self, ctx: &mut Ctx, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<RepoError> + Send,
        F: for<'c> FnOnce(&'c mut Ctx) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        Repository::transaction(self, ctx, f).await
    }
}

/// Open the configured database. Unsupported types and unreachable
/// databases are startup errors.
pub async fn new_db(conf: &DbConfig) -> Result<Database, StartupError> {
    let driver: Driver = conf.kind.parse()?;
    if !driver.accepts(&conf.dsn) {
        return Err(StartupError::DsnMismatch { driver });
    }

    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(conf.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&conf.dsn)
        .await
        .map_err(StartupError::Database)?;

    tracing::info!(driver = %driver, "database connected");
    Ok(Database::new(pool, driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use tempfile::TempDir;

    async fn sqlite_repo() -> (TempDir, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let conf = DbConfig {
            kind: "sqlite".into(),
            dsn: format!("sqlite://{}?mode=rwc", dir.path().join("repo.db").display()),
            max_connections: 1,
        };
        let db = new_db(&conf).await.unwrap();
        let repo = Repository::new(db, Arc::new(MemoryCache::new()));
        let mut ctx = Ctx::background();
        repo.db(&mut ctx)
            .execute_raw("CREATE TABLE items (name TEXT NOT NULL)")
            .await
            .unwrap();
        (dir, Arc::new(repo))
    }

    async fn count(repo: &Repository) -> i64 {
        let mut ctx = Ctx::background();
        repo.db(&mut ctx)
            .fetch_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM items"))
            .await
            .unwrap()
    }

    async fn insert(repo: &Repository, ctx: &mut Ctx, name: &str) -> Result<(), RepoError> {
        let sql = repo.driver().bind_sql("INSERT INTO items (name) VALUES ($1)");
        repo.db(ctx)
            .execute(sqlx::query(&sql).bind(name.to_string()))
            .await?;
        Ok(())
    }

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Repo(#[from] RepoError),
        #[error("boom")]
        Boom,
    }

    #[tokio::test]
    async fn db_without_transaction_uses_pool() {
        let (_dir, repo) = sqlite_repo().await;
        let mut ctx = Ctx::background();
        assert!(!repo.db(&mut ctx).in_transaction());
    }

    #[tokio::test]
    async fn commit_on_ok() {
        let (_dir, repo) = sqlite_repo().await;
        let inner = Arc::clone(&repo);
        let mut ctx = Ctx::background();

        repo.transaction(&mut ctx, move |ctx| {
            Box::pin(async move {
                assert!(inner.db(ctx).in_transaction());
                insert(&inner, ctx, "a").await?;
                insert(&inner, ctx, "b").await?;
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap();

        assert!(!ctx.in_transaction());
        assert_eq!(count(&repo).await, 2);
    }

    #[tokio::test]
    async fn rollback_on_err() {
        let (_dir, repo) = sqlite_repo().await;
        let inner = Arc::clone(&repo);
        let mut ctx = Ctx::background();

        let result = repo
            .transaction(&mut ctx, move |ctx| {
                Box::pin(async move {
                    insert(&inner, ctx, "a").await?;
                    Err::<(), _>(TestError::Boom)
                })
            })
            .await;

        assert!(matches!(result, Err(TestError::Boom)));
        assert_eq!(count(&repo).await, 0);
    }

    #[tokio::test]
    async fn nested_transaction_shares_outer_rollback() {
        let (_dir, repo) = sqlite_repo().await;
        let outer = Arc::clone(&repo);
        let mut ctx = Ctx::background();

        let result = repo
            .transaction(&mut ctx, move |ctx| {
                Box::pin(async move {
                    insert(&outer, ctx, "outer").await?;
                    let nested = Arc::clone(&outer);
                    outer
                        .transaction(ctx, move |ctx| {
                            Box::pin(async move {
                                assert_eq!(ctx.savepoint_depth(), 1);
                                insert(&nested, ctx, "inner").await?;
                                Ok::<_, TestError>(())
                            })
                        })
                        .await?;
                    Err::<(), _>(TestError::Boom)
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(count(&repo).await, 0);
    }

    #[tokio::test]
    async fn failed_nested_transaction_rolls_back_to_savepoint() {
        let (_dir, repo) = sqlite_repo().await;
        let outer = Arc::clone(&repo);
        let mut ctx = Ctx::background();

        repo.transaction(&mut ctx, move |ctx| {
            Box::pin(async move {
                insert(&outer, ctx, "kept").await?;
                let nested = Arc::clone(&outer);
                let inner = outer
                    .transaction(ctx, move |ctx| {
                        Box::pin(async move {
                            insert(&nested, ctx, "dropped").await?;
                            Err::<(), _>(TestError::Boom)
                        })
                    })
                    .await;
                assert!(inner.is_err());
                assert_eq!(ctx.savepoint_depth(), 0);
                assert!(ctx.in_transaction());
                Ok::<_, TestError>(())
            })
        })
        .await
        .unwrap();

        assert_eq!(count(&repo).await, 1);
    }

    #[tokio::test]
    async fn writes_inside_transaction_are_visible_to_nested_reads() {
        let (_dir, repo) = sqlite_repo().await;
        let inner = Arc::clone(&repo);
        let mut ctx = Ctx::background();

        let seen = repo
            .transaction(&mut ctx, move |ctx| {
                Box::pin(async move {
                    insert(&inner, ctx, "a").await?;
                    let n: i64 = inner
                        .db(ctx)
                        .fetch_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM items"))
                        .await?;
                    Ok::<_, TestError>(n)
                })
            })
            .await
            .unwrap();

        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn unsupported_type_is_a_startup_error() {
        let conf = DbConfig {
            kind: "oracle".into(),
            dsn: "oracle://localhost".into(),
            max_connections: 1,
        };
        let err = new_db(&conf).await.unwrap_err();
        assert!(matches!(err, StartupError::UnsupportedDatabase(_)));
    }

    #[tokio::test]
    async fn mismatched_dsn_is_a_startup_error() {
        let conf = DbConfig {
            kind: "postgres".into(),
            dsn: "sqlite::memory:".into(),
            max_connections: 1,
        };
        let err = new_db(&conf).await.unwrap_err();
        assert!(matches!(err, StartupError::DsnMismatch { .. }));
    }
}
