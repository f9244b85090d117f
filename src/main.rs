use clap::Parser;
use futures_bot::cli::{Cli, Commands};
use futures_bot::config::Config;
use futures_bot::data::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    let _telemetry = futures_bot::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Status => {
            let store = SnapshotStore::new(&config.data.snapshot_path);
            let Some(snapshot) = store.load().await? else {
                println!("No snapshot at {}", store.path().display());
                return Ok(());
            };
            let portfolio = &snapshot.portfolio;
            println!("futures-bot status (saved {})", snapshot.saved_at);
            println!("  Equity: {} (peak {})", portfolio.equity, portfolio.peak_equity);
            println!("  Daily PnL: {}", portfolio.daily_realized_pnl);
            println!("  Consecutive losses: {}", portfolio.consecutive_losses);
            println!(
                "  Trading: {}",
                if portfolio.trading_paused {
                    format!("paused {:?}", portfolio.pause_reasons)
                } else {
                    "active".to_string()
                }
            );
            println!("  Open positions: {}", snapshot.positions.len());
            for position in &snapshot.positions {
                println!(
                    "    {} {:?} qty={} entry={} sl={} tp={}",
                    position.symbol,
                    position.side,
                    position.quantity,
                    position.entry_price,
                    position.stop_loss_price,
                    position.take_profit_price
                );
            }
            println!("  Strategies:");
            for state in &snapshot.strategies {
                println!(
                    "    {}: {:?} weight={} trades={} pnl={}",
                    state.strategy_id, state.enablement, state.weight, state.total_trades, state.total_pnl
                );
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
