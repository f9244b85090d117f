//! Configuration types for futures-bot

use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Driver loop and symbol selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Fixed symbol list; empty selects by volume each refresh
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Minimum 24h quote volume for automatic selection
    #[serde(default = "default_min_volume")]
    pub min_volume: Decimal,

    /// Maximum symbols evaluated per cycle
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,

    /// Seconds between driver cycles
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Re-select symbols every N cycles
    #[serde(default = "default_symbol_refresh_cycles")]
    pub symbol_refresh_cycles: u64,
}

fn default_min_volume() -> Decimal {
    dec!(1000000)
}
fn default_max_symbols() -> usize {
    10
}
fn default_update_interval() -> u64 {
    60
}
fn default_symbol_refresh_cycles() -> u64 {
    10
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: vec![],
            min_volume: default_min_volume(),
            max_symbols: default_max_symbols(),
            update_interval_secs: default_update_interval(),
            symbol_refresh_cycles: default_symbol_refresh_cycles(),
        }
    }
}

/// Risk management configuration
///
/// Percentages are in percent (5.0 = 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    /// Leverage used when no strategy recommends one
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,

    #[serde(default = "default_max_position_size_percent")]
    pub max_position_size_percent: Decimal,

    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,

    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: Decimal,

    #[serde(default = "default_take_profit_percent")]
    pub take_profit_percent: Decimal,

    /// Divide stop/target offsets by leverage (percent of margin)
    #[serde(default)]
    pub scale_stops_by_leverage: bool,

    #[serde(default = "default_daily_loss_limit_percent")]
    pub daily_loss_limit_percent: Decimal,

    #[serde(default = "default_drawdown_threshold_percent")]
    pub drawdown_threshold_percent: Decimal,

    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// Streak length at which the risk multiplier halves
    #[serde(default = "default_loss_streak_reduction")]
    pub loss_streak_reduction: u32,

    /// Aggregated strength at which a decision gets full size
    #[serde(default = "default_reference_strength")]
    pub reference_strength: Decimal,

    /// Lift the consecutive-loss pause after this many seconds
    #[serde(default)]
    pub consecutive_loss_cooldown_secs: Option<u64>,

    /// UTC hour at which the trading day rolls
    #[serde(default)]
    pub daily_reset_hour_utc: u32,

    /// Derive sizing, leverage and stop distances from market conditions
    /// and recent performance, capped by the limits above
    #[serde(default)]
    pub adaptive_mode: bool,

    /// Decimal places kept on notional size
    #[serde(default = "default_size_decimals")]
    pub size_decimals: u32,

    /// Decimal places kept on order quantity
    #[serde(default = "default_quantity_decimals")]
    pub quantity_decimals: u32,
}

fn default_max_leverage() -> u32 {
    10
}
fn default_leverage() -> u32 {
    5
}
fn default_max_position_size_percent() -> Decimal {
    dec!(5)
}
fn default_max_open_positions() -> usize {
    5
}
fn default_stop_loss_percent() -> Decimal {
    dec!(2)
}
fn default_take_profit_percent() -> Decimal {
    dec!(4)
}
fn default_daily_loss_limit_percent() -> Decimal {
    dec!(10)
}
fn default_drawdown_threshold_percent() -> Decimal {
    dec!(15)
}
fn default_max_consecutive_losses() -> u32 {
    5
}
fn default_loss_streak_reduction() -> u32 {
    2
}
fn default_reference_strength() -> Decimal {
    dec!(0.5)
}
fn default_size_decimals() -> u32 {
    2
}
fn default_quantity_decimals() -> u32 {
    6
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_leverage: default_max_leverage(),
            default_leverage: default_leverage(),
            max_position_size_percent: default_max_position_size_percent(),
            max_open_positions: default_max_open_positions(),
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_percent: default_take_profit_percent(),
            scale_stops_by_leverage: false,
            daily_loss_limit_percent: default_daily_loss_limit_percent(),
            drawdown_threshold_percent: default_drawdown_threshold_percent(),
            max_consecutive_losses: default_max_consecutive_losses(),
            loss_streak_reduction: default_loss_streak_reduction(),
            reference_strength: default_reference_strength(),
            consecutive_loss_cooldown_secs: None,
            daily_reset_hour_utc: 0,
            adaptive_mode: false,
            size_decimals: default_size_decimals(),
            quantity_decimals: default_quantity_decimals(),
        }
    }
}

/// Per-plugin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base weight in [0, 1]
    #[serde(default = "default_plugin_weight")]
    pub weight: Decimal,
}

fn default_true() -> bool {
    true
}
fn default_plugin_weight() -> Decimal {
    Decimal::ONE
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: default_plugin_weight(),
        }
    }
}

/// Strategy aggregation and adaptation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// |net score| below which the aggregate is neutral
    #[serde(default = "default_neutrality_threshold")]
    pub neutrality_threshold: Decimal,

    /// Rolling outcome window (K)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Win rate below which a strategy with a full window is disabled
    #[serde(default = "default_win_rate_floor")]
    pub win_rate_floor: Decimal,

    #[serde(default = "default_probation_secs")]
    pub probation_secs: u64,

    #[serde(default = "default_min_weight")]
    pub min_weight: Decimal,

    /// Average PnL that maps to a full PnL score
    #[serde(default = "default_pnl_normalizer")]
    pub pnl_normalizer: Decimal,

    #[serde(default)]
    pub plugins: HashMap<String, PluginConfig>,
}

fn default_neutrality_threshold() -> Decimal {
    dec!(0.1)
}
fn default_window_size() -> usize {
    20
}
fn default_win_rate_floor() -> Decimal {
    dec!(0.3)
}
fn default_probation_secs() -> u64 {
    3600
}
fn default_min_weight() -> Decimal {
    dec!(0.1)
}
fn default_pnl_normalizer() -> Decimal {
    dec!(100)
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            neutrality_threshold: default_neutrality_threshold(),
            window_size: default_window_size(),
            win_rate_floor: default_win_rate_floor(),
            probation_secs: default_probation_secs(),
            min_weight: default_min_weight(),
            pnl_normalizer: default_pnl_normalizer(),
            plugins: HashMap::new(),
        }
    }
}

impl StrategyConfig {
    /// Settings for one plugin, defaulting when absent
    pub fn plugin(&self, id: &str) -> PluginConfig {
        self.plugins.get(id).cloned().unwrap_or_default()
    }
}

/// Execution gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Fee as a fraction of notional
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Adverse fill slippage as a fraction of price
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,

    /// Starting paper balance
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_fee_rate() -> Decimal {
    dec!(0.0006)
}
fn default_slippage() -> Decimal {
    dec!(0.0005)
}
fn default_initial_balance() -> Decimal {
    dec!(10000)
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5000
}
fn default_call_timeout_ms() -> u64 {
    10000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            slippage: default_slippage(),
            initial_balance: default_initial_balance(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Data and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Portfolio and strategy snapshot file
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Directory of `<SYMBOL>.jsonl` candle files for the replay feed
    #[serde(default = "default_replay_dir")]
    pub replay_dir: PathBuf,

    /// Bars handed to strategies per snapshot
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    /// Closed trades kept in memory
    #[serde(default = "default_trade_history_len")]
    pub trade_history_len: usize,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/state.json")
}
fn default_replay_dir() -> PathBuf {
    PathBuf::from("./data/candles")
}
fn default_history_len() -> usize {
    150
}
fn default_trade_history_len() -> usize {
    500
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            replay_dir: default_replay_dir(),
            history_len: default_history_len(),
            trade_history_len: default_trade_history_len(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus exporter port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: None,
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> anyhow::Result<()> {
        let risk = &self.risk;
        let percent = |name: &str, value: Decimal| -> anyhow::Result<()> {
            if value <= Decimal::ZERO || value > dec!(100) {
                anyhow::bail!("risk.{} must be in (0, 100], got {}", name, value);
            }
            Ok(())
        };

        if risk.max_leverage == 0 {
            anyhow::bail!("risk.max_leverage must be at least 1");
        }
        if risk.default_leverage == 0 {
            anyhow::bail!("risk.default_leverage must be at least 1");
        }
        percent("max_position_size_percent", risk.max_position_size_percent)?;
        percent("stop_loss_percent", risk.stop_loss_percent)?;
        percent("take_profit_percent", risk.take_profit_percent)?;
        percent("daily_loss_limit_percent", risk.daily_loss_limit_percent)?;
        percent("drawdown_threshold_percent", risk.drawdown_threshold_percent)?;
        if risk.reference_strength <= Decimal::ZERO || risk.reference_strength > Decimal::ONE {
            anyhow::bail!("risk.reference_strength must be in (0, 1]");
        }
        if risk.daily_reset_hour_utc > 23 {
            anyhow::bail!("risk.daily_reset_hour_utc must be in 0..=23");
        }

        let strategy = &self.strategy;
        if strategy.window_size == 0 {
            anyhow::bail!("strategy.window_size must be at least 1");
        }
        if strategy.win_rate_floor < Decimal::ZERO || strategy.win_rate_floor > Decimal::ONE {
            anyhow::bail!("strategy.win_rate_floor must be in [0, 1]");
        }
        if strategy.min_weight < Decimal::ZERO || strategy.min_weight > Decimal::ONE {
            anyhow::bail!("strategy.min_weight must be in [0, 1]");
        }
        if strategy.pnl_normalizer <= Decimal::ZERO {
            anyhow::bail!("strategy.pnl_normalizer must be positive");
        }
        for (id, plugin) in &strategy.plugins {
            if plugin.weight < Decimal::ZERO || plugin.weight > Decimal::ONE {
                anyhow::bail!("strategy.plugins.{}.weight must be in [0, 1]", id);
            }
        }

        if self.trading.update_interval_secs == 0 {
            anyhow::bail!("trading.update_interval_secs must be at least 1");
        }
        if self.execution.initial_balance <= Decimal::ZERO {
            anyhow::bail!("execution.initial_balance must be positive");
        }
        Ok(())
    }
}
