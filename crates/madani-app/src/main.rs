mod cli;
mod commands;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use madani_core::config::AppConfig;
use madani_core::lifecycle;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    lifecycle::init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(cli.config.as_deref());
    lifecycle::log_startup();

    let result = match cli.command {
        Commands::Run { camera } => {
            if let Some(mode) = camera {
                config.camera.mode = mode;
            }
            commands::run(&config).await
        }
        Commands::Simulate {
            steps,
            camera,
            pending,
            timeout_secs,
        } => {
            if let Some(mode) = camera {
                config.camera.mode = mode;
            }
            commands::simulate(
                &config,
                &steps,
                pending.map(Into::into),
                Duration::from_secs(timeout_secs),
            )
            .await
        }
        Commands::ShowConfig => commands::show_config(&config),
    };

    lifecycle::log_shutdown();
    result
}
