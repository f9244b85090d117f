//! Periodic driver loop
//!
//! One cycle: roll the day, reconcile the balance, refresh symbols, resolve
//! in-flight orders, evaluate every symbol concurrently, resolve again, then
//! report closed trades to the strategies and persist.

use super::{CycleReport, EngineError};
use crate::config::Config;
use crate::data::{EngineSnapshot, SnapshotStore};
use crate::execution::{ExecutionGateway, RetryPolicy};
use crate::feed::{FeedError, MarketDataFeed, MarketSnapshot};
use crate::position::PositionManager;
use crate::risk::{MarketConditions, PortfolioState, RiskController};
use crate::strategy::{StrategyManager, TradeResult};
use crate::telemetry::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Result of one per-symbol unit of work
#[derive(Debug, Default)]
struct SymbolOutcome {
    skipped: bool,
    approved: bool,
    rejected: bool,
    closure: bool,
}

/// Decision and risk engine driver
pub struct TradingEngine {
    config: Config,
    feed: Arc<dyn MarketDataFeed>,
    strategies: StrategyManager,
    positions: PositionManager,
    retry: RetryPolicy,
    store: Option<SnapshotStore>,
    symbols: Vec<String>,
    cycle: u64,
    max_cycles: Option<u64>,
}

impl TradingEngine {
    /// Create an engine starting from `equity`
    pub fn new(
        config: Config,
        feed: Arc<dyn MarketDataFeed>,
        gateway: Arc<dyn ExecutionGateway>,
        equity: Decimal,
    ) -> Self {
        let risk = RiskController::from_config(&config.risk);
        let retry = RetryPolicy::from_config(&config.execution);
        let portfolio = PortfolioState::new(equity, Utc::now(), risk.limits());
        let positions = PositionManager::new(
            gateway,
            risk,
            retry.clone(),
            portfolio,
            config.data.trade_history_len,
        );

        Self {
            strategies: StrategyManager::from_config(&config.strategy),
            feed,
            positions,
            retry,
            store: None,
            symbols: Vec::new(),
            cycle: 0,
            max_cycles: None,
            config,
        }
    }

    /// Replace the strategy set
    pub fn with_strategies(mut self, strategies: StrategyManager) -> Self {
        self.strategies = strategies;
        self
    }

    /// Persist a snapshot after every cycle
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Stop after `cycles` cycles
    pub fn with_max_cycles(mut self, cycles: Option<u64>) -> Self {
        self.max_cycles = cycles;
        self
    }

    pub fn strategies(&self) -> &StrategyManager {
        &self.strategies
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// Symbols evaluated last cycle
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Load the persisted snapshot, if any
    pub async fn restore(&mut self) -> Result<bool, EngineError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let Some(snapshot) = store.load().await? else {
            return Ok(false);
        };
        tracing::info!(
            path = %store.path().display(),
            equity = %snapshot.portfolio.equity,
            saved_at = %snapshot.saved_at,
            "Restored engine snapshot"
        );
        self.positions.restore_portfolio(snapshot.portfolio).await;
        self.strategies.restore(snapshot.strategies);
        let resumed = self
            .positions
            .restore_positions(snapshot.positions)
            .await
            .map_err(|e| EngineError::from(e).escalate())?;
        if resumed > 0 {
            tracing::info!(positions = resumed, "Resumed open positions");
        }
        Ok(true)
    }

    /// Run cycles until shutdown, the cycle limit, or a fatal error
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let period = Duration::from_secs(self.config.trading.update_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = period.as_secs(),
            strategies = self.strategies.enabled_count(),
            "Engine started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle(Utc::now()).await {
                        Ok(report) => tracing::info!(
                            cycle = report.cycle,
                            symbols = report.symbols,
                            approved = report.approved,
                            closures = report.closures,
                            "Cycle complete"
                        ),
                        Err(e) => {
                            tracing::error!(error = %e, "Fatal error, stopping engine");
                            self.persist(Utc::now()).await;
                            return Err(e);
                        }
                    }
                    if self.max_cycles.is_some_and(|max| self.cycle >= max) {
                        tracing::info!(cycles = self.cycle, "Cycle limit reached");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Shutdown requested");
                        break;
                    }
                }
            }
        }

        self.persist(Utc::now()).await;
        Ok(())
    }

    /// Run one cycle; only fatal errors are returned
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let started = Instant::now();
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        self.positions.roll_day(now).await;
        self.strategies.refresh_probation(now);

        if let Err(e) = self.positions.reconcile_balance(now).await {
            Self::tolerate(EngineError::from(e), "Balance reconciliation failed")?;
        }

        let refresh_every = self.config.trading.symbol_refresh_cycles.max(1);
        if self.symbols.is_empty() || (self.cycle - 1) % refresh_every == 0 {
            self.refresh_symbols().await?;
        }

        if let Err(e) = self.positions.poll_executions(now).await {
            Self::tolerate(EngineError::from(e), "Execution poll failed")?;
        }

        let this = &*self;
        let outcomes = join_all(this.symbols.iter().map(|symbol| this.process_symbol(symbol, now))).await;
        report.symbols = outcomes.len();
        for outcome in outcomes {
            let outcome = outcome?;
            report.skipped += usize::from(outcome.skipped);
            report.approved += usize::from(outcome.approved);
            report.rejected += usize::from(outcome.rejected);
            report.closures += usize::from(outcome.closure);
        }

        if let Err(e) = self.positions.poll_executions(now).await {
            Self::tolerate(EngineError::from(e), "Execution poll failed")?;
        }

        report.outcomes = self.report_outcomes().await;
        self.publish_metrics().await;
        self.persist(now).await;
        record_latency(LatencyMetric::Cycle, started.elapsed());
        Ok(report)
    }

    /// Log a non-fatal error, or escalate a fatal one
    fn tolerate(error: EngineError, context: &str) -> Result<(), EngineError> {
        if error.is_fatal() {
            return Err(error.escalate());
        }
        tracing::warn!(error = %error, "{}", context);
        Ok(())
    }

    async fn refresh_symbols(&mut self) -> Result<(), EngineError> {
        let trading = &self.config.trading;
        let mut symbols = if trading.symbols.is_empty() {
            let selected = self
                .retry
                .run("select_tradable_symbols", || {
                    self.feed.select_tradable_symbols(trading.min_volume)
                })
                .await;
            match selected {
                Ok(symbols) => symbols,
                Err(e) => {
                    Self::tolerate(EngineError::from(e), "Symbol selection failed")?;
                    return Ok(());
                }
            }
        } else {
            trading.symbols.clone()
        };
        symbols.truncate(trading.max_symbols.max(1));

        // Symbols with live positions stay monitored
        for position in self.positions.positions().await {
            if !symbols.contains(&position.symbol) {
                symbols.push(position.symbol);
            }
        }

        if symbols != self.symbols {
            tracing::info!(count = symbols.len(), symbols = ?symbols, "Tradable symbols updated");
        }
        set_gauge(GaugeMetric::ActiveSymbols, symbols.len() as f64);
        self.symbols = symbols;
        Ok(())
    }

    async fn fetch_snapshot(&self, symbol: &str, now: DateTime<Utc>) -> Result<MarketSnapshot, FeedError> {
        let started = Instant::now();
        let snapshot = self
            .retry
            .run("get_snapshot", || self.feed.get_snapshot(symbol))
            .await;
        record_latency(LatencyMetric::SnapshotFetch, started.elapsed());

        let snapshot = snapshot?;
        let max_age = chrono::Duration::seconds(
            i64::try_from(self.config.trading.update_interval_secs).unwrap_or(i64::MAX),
        );
        if snapshot.is_stale(now, max_age) {
            return Err(FeedError::Stale {
                symbol: symbol.to_string(),
                age_secs: snapshot.age(now).num_seconds(),
            });
        }
        Ok(snapshot)
    }

    /// Fetch, monitor exits, aggregate, evaluate and open for one symbol
    async fn process_symbol(&self, symbol: &str, now: DateTime<Utc>) -> Result<SymbolOutcome, EngineError> {
        let mut outcome = SymbolOutcome::default();

        let snapshot = match self.fetch_snapshot(symbol, now).await {
            Ok(snapshot) => snapshot,
            Err(FeedError::Authentication(reason)) => return Err(EngineError::Authentication(reason)),
            Err(e @ FeedError::Stale { .. }) => {
                increment_counter(CounterMetric::StaleSnapshot);
                tracing::debug!(symbol, error = %e, "Skipping stale snapshot");
                outcome.skipped = true;
                return Ok(outcome);
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Snapshot unavailable");
                outcome.skipped = true;
                return Ok(outcome);
            }
        };

        match self.positions.check_exits(symbol, snapshot.price, now).await {
            Ok(event) => outcome.closure = event.is_some(),
            Err(e) => Self::tolerate(EngineError::from(e), "Exit handling failed")?,
        }

        let aggregated = self.strategies.evaluate(symbol, &snapshot);
        let market = MarketConditions::from_snapshot(&snapshot);
        match self
            .positions
            .evaluate_and_open_with(&aggregated, &market, now)
            .await
        {
            Ok(decision) => {
                outcome.approved = decision.approved;
                outcome.rejected = !decision.approved;
            }
            Err(e) => Self::tolerate(EngineError::from(e), "Entry failed")?,
        }
        Ok(outcome)
    }

    /// Report closed trades to every supporting strategy
    async fn report_outcomes(&mut self) -> usize {
        let closed = self.positions.drain_closed().await;
        for trade in &closed {
            let result = TradeResult {
                pnl: trade.realized_pnl,
                closed_at: trade.closed_at,
            };
            for strategy_id in &trade.position.supporting_strategies {
                if !self.strategies.record_outcome(strategy_id, &result) {
                    tracing::debug!(strategy_id = %strategy_id, "Outcome for unregistered strategy");
                }
            }
        }
        closed.len()
    }

    async fn publish_metrics(&self) {
        let portfolio = self.positions.portfolio().await;
        let gauge = |metric, value: Decimal| set_gauge(metric, value.try_into().unwrap_or(0.0));

        gauge(GaugeMetric::Equity, portfolio.equity);
        gauge(GaugeMetric::DrawdownPct, portfolio.drawdown() * Decimal::ONE_HUNDRED);
        gauge(GaugeMetric::DailyPnl, portfolio.daily_realized_pnl);
        gauge(GaugeMetric::UnrealizedPnl, self.positions.unrealized_pnl().await);
        set_gauge(GaugeMetric::ConsecutiveLosses, f64::from(portfolio.consecutive_losses));
        set_gauge(GaugeMetric::TradingPaused, if portfolio.trading_paused { 1.0 } else { 0.0 });
        set_gauge(GaugeMetric::OpenPositions, self.positions.positions().await.len() as f64);
        set_gauge(GaugeMetric::EnabledStrategies, self.strategies.enabled_count() as f64);
    }

    /// Current restart state
    pub async fn snapshot(&self, now: DateTime<Utc>) -> EngineSnapshot {
        EngineSnapshot {
            portfolio: self.positions.portfolio().await,
            strategies: self.strategies.snapshot(),
            positions: self.positions.positions().await,
            performance: self.positions.performance().await,
            saved_at: now,
        }
    }

    async fn persist(&self, now: DateTime<Utc>) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.snapshot(now).await;
        if let Err(e) = store.save(&snapshot).await {
            tracing::warn!(error = %e, path = %store.path().display(), "Snapshot save failed");
        }
    }
}
