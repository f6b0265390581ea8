use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use madani_core::config::CameraMode;
use madani_core::PendingAction;

#[derive(Parser)]
#[command(name = "mymadani", about = "MyMadani: Digital-ID sign-in flow")]
pub struct Cli {
    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the sign-in flow interactively from stdin
    Run {
        /// Override the simulated camera behavior
        #[arg(long)]
        camera: Option<CameraMode>,
    },

    /// Replay a comma-separated list of actions against real timers
    Simulate {
        /// e.g. login,confirm,confirm (use "reset" to abandon the flow)
        #[arg(long, value_delimiter = ',', required = true)]
        steps: Vec<String>,
        #[arg(long)]
        camera: Option<CameraMode>,
        /// Queue an action to resume after sign-in
        #[arg(long, value_enum)]
        pending: Option<PendingArg>,
        /// Give up if the flow stalls for this long
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PendingArg {
    View,
    Payment,
}

impl From<PendingArg> for PendingAction {
    fn from(arg: PendingArg) -> Self {
        match arg {
            PendingArg::View => PendingAction::view(),
            PendingArg::Payment => PendingAction::payment(),
        }
    }
}
