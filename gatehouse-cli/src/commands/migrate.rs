use std::path::Path;

use anyhow::{Context, Result};
use gatehouse_server::wire;

/// Apply migrations. The app finishes as soon as the schema is in place.
pub async fn run_migrate(config: Option<&Path>) -> Result<()> {
    let conf = super::load_config(config)?;
    let app = wire::fail_fast(wire::new_migrate_app(&conf).await);
    app.run().await.context("migration failed")
}
