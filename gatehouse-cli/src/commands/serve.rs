use std::path::Path;

use anyhow::{Context, Result};
use gatehouse_server::wire;

/// Wire the server app and run it until a shutdown signal.
pub async fn run_serve(config: Option<&Path>) -> Result<()> {
    let conf = super::load_config(config)?;
    let app = wire::fail_fast(wire::new_server_app(&conf).await);

    tracing::info!(app = app.name(), "starting");
    app.run().await.context("server app failed")?;
    tracing::info!("server app stopped");
    Ok(())
}
