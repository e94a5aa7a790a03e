//! gatehouse - signed user API service
//!
//! - `gatehouse serve` runs the HTTP API until Ctrl+C/SIGTERM
//! - `gatehouse migrate` applies the schema and exits

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "gatehouse",
    author,
    version,
    about = "Signed user API over a transactional repository"
)]
struct Cli {
    /// Path to the TOML config (default: config/local.toml)
    #[arg(long, short = 'c', global = true, env = "APP_CONF")]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Serve => commands::run_serve(config).await,
        Commands::Migrate => commands::run_migrate(config).await,
    };

    tracing_setup::shutdown_otel();
    result
}
