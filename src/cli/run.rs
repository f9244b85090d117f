//! Run command implementation

use crate::config::Config;
use crate::data::SnapshotStore;
use crate::engine::TradingEngine;
use crate::execution::PaperGateway;
use crate::feed::ReplayFeed;
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory of `<SYMBOL>.jsonl` candle files (defaults to data.replay_dir)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Starting paper balance (defaults to the restored equity or execution.initial_balance)
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Override trading.update_interval_secs
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(secs) = self.interval_secs {
            config.trading.update_interval_secs = secs;
        }
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(|| config.data.replay_dir.clone());
        let feed = Arc::new(
            ReplayFeed::load_dir(&data_dir)
                .with_context(|| format!("loading candles from {}", data_dir.display()))?
                .with_history_len(config.data.history_len),
        );
        if feed.symbols().is_empty() {
            anyhow::bail!("no candle files in {}", data_dir.display());
        }

        let store = SnapshotStore::new(&config.data.snapshot_path);
        let restored_equity = store.load().await?.map(|s| s.portfolio.equity);
        let capital = self
            .capital
            .or(restored_equity)
            .unwrap_or(config.execution.initial_balance);
        let gateway = Arc::new(PaperGateway::new(
            capital,
            config.execution.fee_rate,
            config.execution.slippage,
        ));

        let period = Duration::from_secs(config.trading.update_interval_secs.max(1));
        let mut engine = TradingEngine::new(config, feed.clone(), gateway, capital)
            .with_store(store)
            .with_max_cycles(self.cycles);
        engine.restore().await?;

        tracing::info!(
            symbols = ?feed.symbols(),
            capital = %capital,
            "Starting paper trading"
        );

        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);

        let ctrl_c_tx = tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C");
                let _ = ctrl_c_tx.send(true);
            }
        });

        let replay_tx = tx.clone();
        let replay = feed.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if replay.is_exhausted().await {
                    tracing::info!("Replay data exhausted");
                    let _ = replay_tx.send(true);
                    break;
                }
            }
        });

        engine.run(rx).await?;

        let performance = engine.positions().performance().await;
        let portfolio = engine.positions().portfolio().await;
        println!("Run complete after {} cycles", engine.cycles());
        println!("  Equity: {}", portfolio.equity);
        println!("  Trades: {} ({} wins, {} losses)", performance.total_trades, performance.winning_trades, performance.losing_trades);
        println!("  Total PnL: {}", performance.total_pnl);
        println!("  Win rate: {:.1}%", performance.win_rate * Decimal::ONE_HUNDRED);
        for stats in engine.strategies().stats() {
            println!(
                "  {}: enabled={} weight={} trades={} win_rate={}",
                stats.strategy_id, stats.enabled, stats.weight, stats.total_trades, stats.win_rate
            );
        }
        Ok(())
    }
}
