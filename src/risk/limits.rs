//! Risk limits
//!
//! Configured percentages converted to fractions once, at construction.

use crate::config::RiskConfig;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Position, loss and drawdown limits
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Global leverage cap
    pub max_leverage: u32,
    /// Leverage when no strategy recommends one
    pub default_leverage: u32,
    /// Maximum position notional as a fraction of equity
    pub max_position_fraction: Decimal,
    /// Maximum concurrent non-terminal positions
    pub max_open_positions: usize,
    /// Stop-loss offset as a fraction of entry price
    pub stop_loss_fraction: Decimal,
    /// Take-profit offset as a fraction of entry price
    pub take_profit_fraction: Decimal,
    /// Divide stop/target offsets by leverage
    pub scale_stops_by_leverage: bool,
    /// Daily loss limit as a fraction of day-start equity
    pub daily_loss_fraction: Decimal,
    /// Drawdown from peak that pauses trading
    pub drawdown_threshold: Decimal,
    /// Losing streak that pauses trading
    pub max_consecutive_losses: u32,
    /// Losing streak that halves the risk multiplier
    pub loss_streak_reduction: u32,
    /// Aggregated strength that earns full size
    pub reference_strength: Decimal,
    /// Optional expiry of the losing-streak pause
    pub consecutive_loss_cooldown: Option<Duration>,
    /// UTC hour of the daily boundary
    pub daily_reset_hour: u32,
    /// Derive sizing, leverage and stops from conditions and performance
    pub adaptive_mode: bool,
    pub size_decimals: u32,
    pub quantity_decimals: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

impl RiskLimits {
    /// Create from RiskConfig
    pub fn from_config(config: &RiskConfig) -> Self {
        let fraction = |percent: Decimal| percent / dec!(100);
        Self {
            max_leverage: config.max_leverage.max(1),
            default_leverage: config.default_leverage.max(1),
            max_position_fraction: fraction(config.max_position_size_percent),
            max_open_positions: config.max_open_positions,
            stop_loss_fraction: fraction(config.stop_loss_percent),
            take_profit_fraction: fraction(config.take_profit_percent),
            scale_stops_by_leverage: config.scale_stops_by_leverage,
            daily_loss_fraction: fraction(config.daily_loss_limit_percent),
            drawdown_threshold: fraction(config.drawdown_threshold_percent),
            max_consecutive_losses: config.max_consecutive_losses,
            loss_streak_reduction: config.loss_streak_reduction,
            reference_strength: config.reference_strength,
            consecutive_loss_cooldown: config
                .consecutive_loss_cooldown_secs
                .map(|secs| Duration::seconds(secs as i64)),
            daily_reset_hour: config.daily_reset_hour_utc.min(23),
            adaptive_mode: config.adaptive_mode,
            size_decimals: config.size_decimals,
            quantity_decimals: config.quantity_decimals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages_become_fractions() {
        let limits = RiskLimits::default();
        assert_eq!(limits.max_position_fraction, dec!(0.05));
        assert_eq!(limits.stop_loss_fraction, dec!(0.02));
        assert_eq!(limits.take_profit_fraction, dec!(0.04));
        assert_eq!(limits.daily_loss_fraction, dec!(0.10));
        assert_eq!(limits.drawdown_threshold, dec!(0.15));
        assert!(limits.consecutive_loss_cooldown.is_none());
        assert!(!limits.adaptive_mode);
    }

    #[test]
    fn test_cooldown_from_config() {
        let config = RiskConfig {
            consecutive_loss_cooldown_secs: Some(600),
            ..RiskConfig::default()
        };
        let limits = RiskLimits::from_config(&config);
        assert_eq!(limits.consecutive_loss_cooldown, Some(Duration::minutes(10)));
    }
}
