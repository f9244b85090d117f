//! CLI interface for futures-bot
//!
//! Provides subcommands for:
//! - `run`: Start the decision loop against a replay feed and paper gateway
//! - `status`: Show the persisted portfolio and strategy state
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "futures-bot")]
#[command(about = "Decision and risk engine for leveraged futures trading")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start paper trading on replayed candles
    Run(RunArgs),
    /// Show persisted state
    Status,
    /// Show configuration
    Config,
}
