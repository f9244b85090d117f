//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Full driver cycle
    Cycle,
    /// Market snapshot fetch
    SnapshotFetch,
    /// Order submission round trip
    OrderSubmission,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Unrealized P&L across open positions
    UnrealizedPnl,
    /// Open position count
    OpenPositions,
    /// Current drawdown percentage
    DrawdownPct,
    /// Daily realized P&L
    DailyPnl,
    /// Consecutive losing trades
    ConsecutiveLosses,
    /// Enabled strategy count
    EnabledStrategies,
    /// 1 while trading is paused
    TradingPaused,
    /// Symbols evaluated per cycle
    ActiveSymbols,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    DecisionApproved,
    DecisionRejected,
    PositionOpened,
    PositionClosed,
    PositionCancelled,
    CloseFailed,
    StrategyFailure,
    StrategyDisabled,
    StaleSnapshot,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::Cycle => "futures_bot_cycle_latency_ms",
            LatencyMetric::SnapshotFetch => "futures_bot_snapshot_fetch_latency_ms",
            LatencyMetric::OrderSubmission => "futures_bot_order_submission_latency_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "futures_bot_equity_usd",
            GaugeMetric::UnrealizedPnl => "futures_bot_unrealized_pnl_usd",
            GaugeMetric::OpenPositions => "futures_bot_open_positions",
            GaugeMetric::DrawdownPct => "futures_bot_drawdown_pct",
            GaugeMetric::DailyPnl => "futures_bot_daily_pnl_usd",
            GaugeMetric::ConsecutiveLosses => "futures_bot_consecutive_losses",
            GaugeMetric::EnabledStrategies => "futures_bot_enabled_strategies",
            GaugeMetric::TradingPaused => "futures_bot_trading_paused",
            GaugeMetric::ActiveSymbols => "futures_bot_active_symbols",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::DecisionApproved => "futures_bot_decisions_approved_total",
            CounterMetric::DecisionRejected => "futures_bot_decisions_rejected_total",
            CounterMetric::PositionOpened => "futures_bot_positions_opened_total",
            CounterMetric::PositionClosed => "futures_bot_positions_closed_total",
            CounterMetric::PositionCancelled => "futures_bot_positions_cancelled_total",
            CounterMetric::CloseFailed => "futures_bot_close_failures_total",
            CounterMetric::StrategyFailure => "futures_bot_strategy_failures_total",
            CounterMetric::StrategyDisabled => "futures_bot_strategies_disabled_total",
            CounterMetric::StaleSnapshot => "futures_bot_stale_snapshots_total",
        }
    }
}

/// Install the Prometheus exporter on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}
