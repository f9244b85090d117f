//! Engine driver integration tests with scripted feed and strategies

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures_bot::config::Config;
use futures_bot::data::SnapshotStore;
use futures_bot::engine::TradingEngine;
use futures_bot::execution::PaperGateway;
use futures_bot::feed::{FeedError, MarketDataFeed, MarketSnapshot};
use futures_bot::risk::PauseReason;
use futures_bot::signal::{Direction, Signal};
use futures_bot::strategy::{AdaptivePolicy, Strategy, StrategyError, StrategyManager};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Feed replaying a scripted price path per symbol; the last price repeats
struct ScriptedFeed {
    prices: Mutex<HashMap<String, VecDeque<Decimal>>>,
    last: Mutex<HashMap<String, Decimal>>,
    age: Duration,
    auth_failure: bool,
}

impl ScriptedFeed {
    fn new(paths: Vec<(&str, Vec<Decimal>)>) -> Self {
        let prices = paths
            .into_iter()
            .map(|(symbol, path)| (symbol.to_string(), path.into_iter().collect()))
            .collect();
        Self {
            prices: Mutex::new(prices),
            last: Mutex::new(HashMap::new()),
            age: Duration::zero(),
            auth_failure: false,
        }
    }

    fn aged(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    fn unauthorized(mut self) -> Self {
        self.auth_failure = true;
        self
    }
}

#[async_trait]
impl MarketDataFeed for ScriptedFeed {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, FeedError> {
        if self.auth_failure {
            return Err(FeedError::Authentication("key expired".into()));
        }
        let next = self
            .prices
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|path| path.pop_front());
        let mut last = self.last.lock().unwrap();
        let price = match next {
            Some(price) => {
                last.insert(symbol.to_string(), price);
                price
            }
            None => *last
                .get(symbol)
                .ok_or_else(|| FeedError::NoData(symbol.to_string()))?,
        };
        Ok(MarketSnapshot::from_history(
            symbol,
            vec![price; 30],
            vec![dec!(100); 30],
            Utc::now() - self.age,
        ))
    }

    async fn select_tradable_symbols(&self, _min_volume: Decimal) -> Result<Vec<String>, FeedError> {
        let mut symbols: Vec<String> = self.prices.lock().unwrap().keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Strategy with a fixed opinion
struct Fixed {
    id: &'static str,
    direction: Direction,
}

impl Strategy for Fixed {
    fn id(&self) -> &str {
        self.id
    }

    fn required_history(&self) -> usize {
        1
    }

    fn produce_signal(&self, symbol: &str, _snapshot: &MarketSnapshot) -> Result<Signal, StrategyError> {
        Ok(Signal::new(self.id, symbol, self.direction, dec!(0.8), dec!(1)).with_leverage(5))
    }
}

fn config(symbols: &[&str]) -> Config {
    let mut config = Config::default();
    config.trading.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config.trading.update_interval_secs = 60;
    config.execution.max_retries = 0;
    config.execution.initial_backoff_ms = 1;
    config
}

fn always_long(config: &Config) -> StrategyManager {
    let mut manager = StrategyManager::new(AdaptivePolicy::from_config(&config.strategy), dec!(0.1));
    manager.register(Box::new(Fixed {
        id: "always_long",
        direction: Direction::Long,
    }));
    manager
}

fn build_engine(config: Config, feed: ScriptedFeed) -> TradingEngine {
    let gateway = Arc::new(PaperGateway::new(dec!(10000), dec!(0), dec!(0)));
    let strategies = always_long(&config);
    TradingEngine::new(config, Arc::new(feed), gateway, dec!(10000)).with_strategies(strategies)
}

#[tokio::test]
async fn test_open_hold_take_profit_and_report() {
    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(50000), dec!(50000), dec!(52000)])]);
    let mut engine = build_engine(config(&["XBTUSDTM"]), feed);

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.approved, 1);
    let position = engine.positions().position("XBTUSDTM").await.unwrap();
    assert_eq!(position.quantity, dec!(0.01));
    assert_eq!(position.stop_loss_price, dec!(49000));
    assert_eq!(position.take_profit_price, dec!(52000));

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.approved, 0);
    assert_eq!(report.rejected, 1);

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.closures, 1);
    assert_eq!(report.outcomes, 1);
    // Re-entry on the same tick after the close
    assert_eq!(report.approved, 1);

    let state = engine.strategies().state("always_long").unwrap();
    assert_eq!(state.total_trades, 1);
    assert_eq!(state.total_wins, 1);
    assert_eq!(engine.positions().portfolio().await.equity, dec!(10020));
}

#[tokio::test]
async fn test_drawdown_pause_blocks_new_entries() {
    let mut config = config(&["XBTUSDTM"]);
    config.risk.max_position_size_percent = dec!(100);
    let feed = ScriptedFeed::new(vec![(
        "XBTUSDTM",
        vec![dec!(50000), dec!(40000), dec!(40000), dec!(41000)],
    )]);
    let mut engine = build_engine(config, feed);

    engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(engine.positions().position("XBTUSDTM").await.unwrap().quantity, dec!(0.2));

    for _ in 0..3 {
        let report = engine.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(report.approved, 0);
        assert!(engine.positions().positions().await.is_empty());
    }

    let portfolio = engine.positions().portfolio().await;
    assert_eq!(portfolio.equity, dec!(8000));
    assert!(portfolio.trading_paused);
    assert!(portfolio.pause_reasons.contains(&PauseReason::Drawdown));
    assert_eq!(engine.positions().performance().await.total_trades, 1);
}

#[tokio::test]
async fn test_losing_strategy_disabled_for_probation() {
    let mut config = config(&["XBTUSDTM"]);
    config.strategy.window_size = 2;
    let feed = ScriptedFeed::new(vec![(
        "XBTUSDTM",
        vec![dec!(50000), dec!(48000), dec!(46000), dec!(46000), dec!(40000), dec!(40000)],
    )]);
    let mut engine = build_engine(config, feed);

    for _ in 0..3 {
        engine.run_cycle(Utc::now()).await.unwrap();
    }
    let state = engine.strategies().state("always_long").unwrap();
    assert!(!state.is_enabled());
    assert!(state.probation_until().is_some());

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.approved, 0);

    // Third position stops out; nothing replaces it while disabled
    engine.run_cycle(Utc::now()).await.unwrap();
    engine.run_cycle(Utc::now()).await.unwrap();
    assert!(engine.positions().positions().await.is_empty());
    assert!(!engine.strategies().state("always_long").unwrap().is_enabled());
    assert_eq!(engine.positions().performance().await.total_trades, 3);
}

#[tokio::test]
async fn test_one_position_per_symbol_across_symbols() {
    let feed = ScriptedFeed::new(vec![
        ("XBTUSDTM", vec![dec!(50000)]),
        ("ETHUSDTM", vec![dec!(3000)]),
        ("SOLUSDTM", vec![dec!(150)]),
    ]);
    let mut engine = build_engine(config(&[]), feed);

    for _ in 0..3 {
        engine.run_cycle(Utc::now()).await.unwrap();
        let positions = engine.positions().positions().await;
        assert_eq!(positions.len(), 3);
        let mut symbols: Vec<String> = positions.into_iter().map(|p| p.symbol).collect();
        symbols.sort();
        symbols.dedup();
        assert_eq!(symbols.len(), 3);
    }
    assert_eq!(engine.symbols().len(), 3);
}

#[tokio::test]
async fn test_stale_snapshot_skipped() {
    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(50000)])]).aged(Duration::hours(2));
    let mut engine = build_engine(config(&["XBTUSDTM"]), feed);

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.approved + report.rejected, 0);
    assert!(engine.positions().positions().await.is_empty());
}

#[tokio::test]
async fn test_authentication_failure_stops_loop() {
    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(50000)])]).unauthorized();
    let mut engine = build_engine(config(&["XBTUSDTM"]), feed);

    let (_tx, rx) = watch::channel(false);
    let err = engine.run(rx).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(engine.cycles(), 1);
}

#[tokio::test]
async fn test_run_persists_and_restores() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));

    let mut config = config(&["XBTUSDTM"]);
    config.trading.update_interval_secs = 1;
    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(50000), dec!(48000)])]);
    let mut engine = build_engine(config.clone(), feed)
        .with_store(store.clone())
        .with_max_cycles(Some(2));

    let (_tx, rx) = watch::channel(false);
    engine.run(rx).await.unwrap();
    assert_eq!(engine.cycles(), 2);

    let snapshot = store.load().await.unwrap().unwrap();
    assert_eq!(snapshot.portfolio.consecutive_losses, 1);
    assert_eq!(snapshot.strategies[0].total_trades, 1);
    // Re-entered at 48000 after the stop
    assert_eq!(snapshot.positions.len(), 1);

    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(48000)])]);
    let mut restarted = build_engine(config, feed).with_store(store);
    assert!(restarted.restore().await.unwrap());
    // A fresh paper account holds no position, so nothing is resumed
    assert!(restarted.positions().positions().await.is_empty());
    assert_eq!(restarted.positions().portfolio().await.consecutive_losses, 1);
    assert_eq!(restarted.strategies().state("always_long").unwrap().total_trades, 1);
}

#[tokio::test]
async fn test_shutdown_signal_stops_loop() {
    let feed = ScriptedFeed::new(vec![("XBTUSDTM", vec![dec!(50000)])]);
    let mut engine = build_engine(config(&["XBTUSDTM"]), feed);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        engine.run(rx).await.map(|_| engine.cycles())
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let cycles = handle.await.unwrap().unwrap();
    assert_eq!(cycles, 1);
}
