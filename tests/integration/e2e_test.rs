//! End-to-end integration tests over the full default stack

use chrono::Utc;
use futures_bot::config::Config;
use futures_bot::data::SnapshotStore;
use futures_bot::engine::TradingEngine;
use futures_bot::execution::{ExecutionGateway, PaperGateway};
use futures_bot::feed::{Candle, MarketDataFeed, ReplayFeed};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

fn candles(base: f64, amplitude: f64, volume: f64, bars: usize) -> Vec<Candle> {
    (0..bars)
        .map(|i| {
            let t = i as f64;
            let close = base + amplitude * (t / 15.0).sin() + base * 0.0001 * t;
            Candle {
                close: Decimal::try_from(close).unwrap().round_dp(2),
                volume: Decimal::try_from(volume + (i % 7) as f64).unwrap(),
                timestamp: None,
            }
        })
        .collect()
}

fn write_series(dir: &Path, symbol: &str, series: &[Candle]) {
    let lines: Vec<String> = series
        .iter()
        .map(|c| serde_json::to_string(c).unwrap())
        .collect();
    std::fs::write(dir.join(format!("{symbol}.jsonl")), lines.join("\n")).unwrap();
}

fn example_config() -> Config {
    toml::from_str(include_str!("../../config.toml.example")).unwrap()
}

#[test]
fn test_config_example_loads() {
    let config = example_config();
    config.validate().unwrap();
    assert!(config.trading.symbols.is_empty());
    assert_eq!(config.risk.max_leverage, 10);
    assert_eq!(config.strategy.plugins.len(), 4);
}

#[tokio::test]
async fn test_replay_selects_by_volume() {
    let mut series = HashMap::new();
    series.insert("XBTUSDTM".to_string(), candles(50000.0, 500.0, 10.0, 200));
    series.insert("ETHUSDTM".to_string(), candles(3000.0, 30.0, 100.0, 200));
    series.insert("DOGEUSDTM".to_string(), candles(0.1, 0.001, 100.0, 200));
    let feed = ReplayFeed::new(series);

    let symbols = feed.select_tradable_symbols(dec!(1000000)).await.unwrap();
    assert_eq!(symbols, vec!["XBTUSDTM".to_string(), "ETHUSDTM".to_string()]);
}

#[tokio::test]
async fn test_full_stack_replay_invariants() {
    let dir = tempfile::tempdir().unwrap();
    write_series(dir.path(), "XBTUSDTM", &candles(50000.0, 3000.0, 10.0, 400));
    write_series(dir.path(), "ETHUSDTM", &candles(3000.0, 250.0, 100.0, 400));
    write_series(dir.path(), "DOGEUSDTM", &candles(0.1, 0.01, 100.0, 400));

    let mut config = example_config();
    config.execution.max_retries = 0;
    config.data.snapshot_path = dir.path().join("state.json");

    let feed = Arc::new(
        ReplayFeed::load_dir(dir.path())
            .unwrap()
            .with_history_len(config.data.history_len),
    );
    let gateway = Arc::new(PaperGateway::from_config(&config.execution));
    let max_fraction = config.risk.max_position_size_percent / dec!(100);
    let max_leverage = config.risk.max_leverage;

    let mut engine = TradingEngine::new(config.clone(), feed.clone(), gateway.clone(), dec!(10000))
        .with_store(SnapshotStore::new(&config.data.snapshot_path));

    // 400 bars with 150 of warm-up history leave 251 live bars per symbol
    for _ in 0..260 {
        engine.run_cycle(Utc::now()).await.unwrap();

        let portfolio = engine.positions().portfolio().await;
        let positions = engine.positions().positions().await;
        let symbols: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols.len(), positions.len(), "one position per symbol");
        for position in &positions {
            assert!(position.leverage >= 1 && position.leverage <= max_leverage);
            // Fill slippage can lift notional marginally above the decision size
            assert!(position.size <= max_fraction * portfolio.peak_equity * dec!(1.001));
        }
    }
    assert_eq!(engine.cycles(), 260);
    assert_eq!(engine.symbols(), &["XBTUSDTM".to_string(), "ETHUSDTM".to_string()]);

    let history = engine.positions().history().await;
    let closed = history.iter().filter(|t| t.is_closed()).count();
    let performance = engine.positions().performance().await;
    assert_eq!(performance.total_trades, closed);

    let credited: u64 = engine.strategies().stats().iter().map(|s| s.total_trades).sum();
    assert!(credited >= closed as u64);

    engine.positions().reconcile_balance(Utc::now()).await.unwrap();
    assert_eq!(
        engine.positions().portfolio().await.equity,
        gateway.get_balance().await.unwrap()
    );
    assert!(config.data.snapshot_path.exists());
}
