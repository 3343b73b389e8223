// Steward Agent Engine
// Main entry point for the steward binary

use clap::Parser;
use steward_engine::cli::{handle_config, handle_run, Cli, Commands};
use steward_engine::config::Config;
use steward_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Steward Engine v{}", env!("CARGO_PKG_VERSION"));

    // Re-initialize telemetry with the config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    if let Ok(config) = Config::load_or_create() {
        init_telemetry_with_level(&config.core.log_level);
    }

    match cli.command {
        Commands::Run {
            instruction,
            autonomy,
            mode,
            workspace,
        } => handle_run(instruction, autonomy, mode, workspace).await,
        Commands::Config => handle_config(),
    }
}
