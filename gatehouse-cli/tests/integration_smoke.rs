//! Smoke tests for the gatehouse binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gatehouse() -> Command {
    let mut cmd = Command::cargo_bin("gatehouse").unwrap();
    cmd.env_remove("APP_CONF").env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, db_type: &str, dsn: &str) -> std::path::PathBuf {
    let path = dir.path().join("gatehouse.toml");
    let body = format!(
        r#"
[http]
host = "127.0.0.1"
port = 0

[data.db]
type = "{db_type}"
dsn = "{dsn}"

[data.redis]
addr = "127.0.0.1:6379"

[security.api_sign]
app_key = "K"
app_secret = "S"
"#
    );
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_help_lists_subcommands() {
    gatehouse()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_serve_help() {
    gatehouse()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    gatehouse()
        .current_dir(dir.path())
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config/local.toml"));
}

#[test]
fn test_unsupported_database_type_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "oracle", "oracle://localhost/db");
    gatehouse()
        .arg("--config")
        .arg(&config)
        .arg("migrate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("oracle error: unsupported database type"));
}

#[test]
fn test_unreachable_redis_exits_1() {
    let dir = TempDir::new().unwrap();
    let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("serve.db").display());
    let config = write_config(&dir, "sqlite", &dsn);
    let contents = std::fs::read_to_string(&config)
        .unwrap()
        .replace("127.0.0.1:6379", "127.0.0.1:1");
    std::fs::write(&config, contents).unwrap();

    gatehouse()
        .arg("--config")
        .arg(&config)
        .arg("serve")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("redis error"));
}

#[test]
fn test_sqlite_migrate_succeeds() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("smoke.db");
    let dsn = format!("sqlite://{}?mode=rwc", db.display());
    let config = write_config(&dir, "sqlite", &dsn);

    gatehouse()
        .arg("--config")
        .arg(&config)
        .arg("migrate")
        .assert()
        .success()
        .stderr(predicate::str::contains("migrate success"));

    assert!(db.exists());
}
