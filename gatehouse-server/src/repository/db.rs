//! Database handle and driver selection

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::{AnyConnection, AnyPool, Executor, FromRow};
use tokio::time::Instant;

use super::{Ctx, RepoError};
use crate::error::StartupError;

/// Supported SQL backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    MySql,
    Sqlite,
}

impl Driver {
    /// URL schemes sqlx accepts for this driver.
    fn schemes(self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["postgres:", "postgresql:"],
            Self::MySql => &["mysql:", "mariadb:"],
            Self::Sqlite => &["sqlite:"],
        }
    }

    /// Whether `dsn` names this driver. The any-driver dispatches on the
    /// URL scheme, so a mismatch would silently connect to something else.
    pub fn accepts(self, dsn: &str) -> bool {
        self.schemes().iter().any(|scheme| dsn.starts_with(scheme))
    }

    /// Rewrite `$1, $2, ...` markers into this driver's placeholder syntax.
    ///
    /// Markers must appear in ascending order and never inside string literals.
    pub fn bind_sql(self, sql: &str) -> Cow<'_, str> {
        if self == Self::Postgres {
            return Cow::Borrowed(sql);
        }

        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                    chars.next();
                }
                out.push('?');
            } else {
                out.push(c);
            }
        }
        Cow::Owned(out)
    }
}

impl FromStr for Driver {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StartupError::UnsupportedDatabase(other.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Connection pool plus the driver it was opened with
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: AnyPool,
    pub(crate) driver: Driver,
}

impl Database {
    pub fn new(pool: AnyPool, driver: Driver) -> Self {
        Self { pool, driver }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Query handle for `ctx`: its bound transaction if any, else the pool.
    pub fn handle<'a>(&'a self, ctx: &'a mut Ctx) -> Db<'a> {
        let deadline = ctx.deadline();
        let conn = match ctx.tx.as_mut() {
            Some(tx) => Conn::Tx(&mut **tx),
            None => Conn::Pool(&self.pool),
        };

        Db { conn, deadline }
    }
}

pub(crate) enum Conn<'a> {
    Pool(&'a AnyPool),
    Tx(&'a mut AnyConnection),
}

/// Query handle returned by [`Repository::db`](super::Repository::db).
///
/// Runs on the context's bound transaction when there is one, otherwise on
/// the pool. Every call is bounded by the context deadline.
pub struct Db<'a> {
    pub(crate) conn: Conn<'a>,
    pub(crate) deadline: Option<Instant>,
}

impl<'a> Db<'a> {
    pub fn in_transaction(&self) -> bool {
        matches!(self.conn, Conn::Tx(_))
    }

    pub async fn execute<'q>(
        &mut self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Result<AnyQueryResult, RepoError> {
        let deadline = self.deadline;
        match &mut self.conn {
            Conn::Pool(pool) => bounded(deadline, query.execute(*pool)).await,
            Conn::Tx(conn) => bounded(deadline, query.execute(&mut **conn)).await,
        }
    }

    /// Run a statement over the text protocol (DDL, savepoints).
    pub async fn execute_raw(&mut self, sql: &str) -> Result<AnyQueryResult, RepoError> {
        let deadline = self.deadline;
        match &mut self.conn {
            Conn::Pool(pool) => bounded(deadline, (*pool).execute(sql)).await,
            Conn::Tx(conn) => bounded(deadline, (&mut **conn).execute(sql)).await,
        }
    }

    pub async fn fetch_optional<'q, O>(
        &mut self,
        query: QueryAs<'q, Any, O, AnyArguments<'q>>,
    ) -> Result<Option<O>, RepoError>
    where
        O: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let deadline = self.deadline;
        match &mut self.conn {
            Conn::Pool(pool) => bounded(deadline, query.fetch_optional(*pool)).await,
            Conn::Tx(conn) => bounded(deadline, query.fetch_optional(&mut **conn)).await,
        }
    }

    pub async fn fetch_scalar<'q, O>(
        &mut self,
        query: QueryScalar<'q, Any, O, AnyArguments<'q>>,
    ) -> Result<O, RepoError>
    where
        O: Send + Unpin,
        (O,): for<'r> FromRow<'r, AnyRow>,
    {
        let deadline = self.deadline;
        match &mut self.conn {
            Conn::Pool(pool) => bounded(deadline, query.fetch_one(*pool)).await,
            Conn::Tx(conn) => bounded(deadline, query.fetch_one(&mut **conn)).await,
        }
    }
}

/// Await `fut`, failing with `DeadlineExceeded` once `deadline` passes.
pub(crate) async fn bounded<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| RepoError::DeadlineExceeded)?
            .map_err(RepoError::from),
        None => fut.await.map_err(RepoError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_drivers() {
        assert_eq!("postgres".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!("mysql".parse::<Driver>().unwrap(), Driver::MySql);
        assert_eq!("sqlite".parse::<Driver>().unwrap(), Driver::Sqlite);
    }

    #[test]
    fn rejects_unknown_driver() {
        let err = "oracle".parse::<Driver>().unwrap_err();
        assert!(matches!(err, StartupError::UnsupportedDatabase(ref t) if t == "oracle"));
    }

    #[test]
    fn dsn_scheme_must_match() {
        assert!(Driver::Postgres.accepts("postgresql://localhost/app"));
        assert!(Driver::Sqlite.accepts("sqlite::memory:"));
        assert!(!Driver::MySql.accepts("postgres://localhost/app"));
    }

    #[test]
    fn bind_sql_keeps_postgres_markers() {
        let sql = "SELECT * FROM users WHERE user_id = $1";
        assert_eq!(Driver::Postgres.bind_sql(sql), sql);
    }

    #[test]
    fn bind_sql_rewrites_for_question_mark_drivers() {
        let sql = "UPDATE users SET nickname = $1, updated_at = $2 WHERE user_id = $10";
        assert_eq!(
            Driver::MySql.bind_sql(sql),
            "UPDATE users SET nickname = ?, updated_at = ? WHERE user_id = ?"
        );
        assert_eq!(Driver::Sqlite.bind_sql("SELECT '$'"), "SELECT '$'");
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_reports_deadline() {
        let deadline = Instant::now() + std::time::Duration::from_millis(10);
        let result: Result<(), RepoError> = bounded(Some(deadline), async {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RepoError::DeadlineExceeded)));
    }
}
