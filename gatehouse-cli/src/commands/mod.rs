//! Subcommand implementations

mod migrate;
mod serve;

use std::path::Path;

use anyhow::{Context, Result};
use gatehouse_core::Config;

pub use migrate::run_migrate;
pub use serve::run_serve;

/// Load the config from `--config`, `APP_CONF` or the default path.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = Config::resolve_path(explicit);
    tracing::debug!(path = %path.display(), "loading config");
    Config::load(&path).with_context(|| format!("failed to load config {}", path.display()))
}
