//! Schema migration server
//!
//! Creates the tables the repositories need, then finishes. Statements are
//! portable across postgres, mysql and sqlite.

use async_trait::async_trait;

use crate::app::{Server, ServerError};
use crate::repository::{Ctx, Database, RepoError};

const MIGRATIONS: &[(&str, &str)] = &[(
    "create_users",
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id VARCHAR(64) NOT NULL PRIMARY KEY,
        nickname VARCHAR(255) NOT NULL,
        email VARCHAR(255) NOT NULL UNIQUE,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL
    )
    "#,
)];

/// Run all migrations against `db`.
pub async fn run(db: &Database) -> Result<(), RepoError> {
    let mut ctx = Ctx::background();

    for (name, sql) in MIGRATIONS {
        tracing::debug!(migration = *name, "applying");
        db.handle(&mut ctx).execute_raw(sql).await?;
    }

    tracing::info!(count = MIGRATIONS.len(), "migrations applied");
    Ok(())
}

pub struct Migrate {
    db: Database,
}

impl Migrate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Server for Migrate {
    fn name(&self) -> &str {
        "migrate"
    }

    async fn start(&self) -> Result<(), ServerError> {
        run(&self.db).await?;
        tracing::info!("migrate success");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        tracing::info!("migrate stop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::repository::new_db;
    use gatehouse_core::DbConfig;

    async fn sqlite_db(dir: &tempfile::TempDir) -> Database {
        new_db(&DbConfig {
            kind: "sqlite".into(),
            dsn: format!("sqlite://{}?mode=rwc", dir.path().join("m.db").display()),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = sqlite_db(&dir).await;
        run(&db).await.unwrap();
        run(&db).await.unwrap();

        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn migrate_app_finishes_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let db = sqlite_db(&dir).await;
        let app = App::new("migrate").with_server(Migrate::new(db));
        app.run_until(std::future::pending()).await.unwrap();
    }
}
