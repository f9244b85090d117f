//! Adaptive risk parameters
//!
//! Derives leverage, position size, stop-loss and take-profit percentages
//! from market volatility, trend strength and recent trade performance.
//! Every output is bounded, and the target never falls below 1.5x the stop.

use crate::feed::MarketSnapshot;
use crate::indicators;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Closed trades considered for performance
pub const PERFORMANCE_WINDOW: usize = 100;

/// Trades needed before performance moves any parameter
const MIN_TRADES: usize = 10;

/// Market state for one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketConditions {
    /// Relative price dispersion, e.g. 0.05 for 5%
    pub volatility: Decimal,
    /// Signed trend strength in [-1, 1]
    pub trend_strength: Decimal,
    /// Current volume relative to its average
    pub volume_ratio: Decimal,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            volatility: dec!(0.05),
            trend_strength: Decimal::ZERO,
            volume_ratio: Decimal::ONE,
        }
    }
}

impl MarketConditions {
    /// Conditions from a snapshot's indicators; missing values fall back to defaults
    ///
    /// Trend strength is the fast/slow EMA gap scaled so a 5% gap is full strength.
    pub fn from_snapshot(snapshot: &MarketSnapshot) -> Self {
        let defaults = Self::default();
        let ind = &snapshot.indicators;
        let trend_strength = match (ind.ema_fast, ind.ema_slow) {
            (Some(fast), Some(slow)) if slow > Decimal::ZERO => {
                ((fast - slow) / slow * dec!(20)).clamp(Decimal::NEGATIVE_ONE, Decimal::ONE)
            }
            _ => defaults.trend_strength,
        };
        Self {
            volatility: ind.volatility.unwrap_or(defaults.volatility),
            trend_strength,
            volume_ratio: ind.volume_ratio.unwrap_or(defaults.volume_ratio),
        }
    }
}

/// Performance over recent closed trades
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePerformance {
    pub win_rate: Decimal,
    /// Mean PnL of winning trades
    pub avg_profit: Decimal,
    /// Mean absolute PnL of losing trades
    pub avg_loss: Decimal,
    /// Mean PnL over its standard deviation
    pub sharpe_ratio: Decimal,
    pub total_trades: usize,
}

impl Default for TradePerformance {
    fn default() -> Self {
        Self {
            win_rate: dec!(0.5),
            avg_profit: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            total_trades: 0,
        }
    }
}

impl TradePerformance {
    /// Performance from realized PnLs, oldest first
    pub fn from_results(results: &[Decimal]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let total = Decimal::from(results.len());
        let wins: Vec<Decimal> = results.iter().copied().filter(|r| *r > Decimal::ZERO).collect();
        let losses: Vec<Decimal> = results.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
        let mean = |values: &[Decimal]| {
            if values.is_empty() {
                Decimal::ZERO
            } else {
                values.iter().sum::<Decimal>() / Decimal::from(values.len())
            }
        };

        let sharpe_ratio = if results.len() >= 2 {
            match indicators::std_dev(results) {
                Some(sd) if sd > Decimal::ZERO => mean(results) / sd,
                _ => Decimal::ZERO,
            }
        } else {
            Decimal::ZERO
        };

        Self {
            win_rate: Decimal::from(wins.len()) / total,
            avg_profit: mean(&wins),
            avg_loss: mean(&losses).abs(),
            sharpe_ratio,
            total_trades: results.len(),
        }
    }

    fn has_history(&self) -> bool {
        self.total_trades >= MIN_TRADES
    }
}

/// Effective risk parameters, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParameters {
    pub max_leverage: u32,
    pub max_position_size_percent: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
}

/// Calculator for adaptive risk parameters
#[derive(Debug, Clone)]
pub struct AdaptiveRiskSettings {
    pub base_leverage: u32,
    pub base_position_size_percent: Decimal,
    pub base_stop_loss_percent: Decimal,
    pub base_take_profit_percent: Decimal,
    pub leverage_bounds: (u32, u32),
    pub position_size_bounds: (Decimal, Decimal),
    pub stop_loss_bounds: (Decimal, Decimal),
    pub take_profit_bounds: (Decimal, Decimal),
    /// Minimum take-profit to stop-loss ratio
    pub min_reward_ratio: Decimal,
}

impl Default for AdaptiveRiskSettings {
    fn default() -> Self {
        Self {
            base_leverage: 5,
            base_position_size_percent: dec!(3),
            base_stop_loss_percent: dec!(2),
            base_take_profit_percent: dec!(4),
            leverage_bounds: (1, 20),
            position_size_bounds: (dec!(1), dec!(10)),
            stop_loss_bounds: (dec!(0.5), dec!(5)),
            take_profit_bounds: (dec!(1), dec!(10)),
            min_reward_ratio: dec!(1.5),
        }
    }
}

impl AdaptiveRiskSettings {
    /// Lower in high volatility and after a poor win rate, higher in strong trends
    pub fn leverage(&self, market: &MarketConditions, performance: &TradePerformance) -> u32 {
        let volatility_factor = if market.volatility > dec!(0.10) {
            (Decimal::ONE - market.volatility * dec!(3)).max(dec!(0.3))
        } else if market.volatility < dec!(0.03) {
            dec!(1.2)
        } else {
            Decimal::ONE
        };

        let performance_factor = if !performance.has_history() {
            dec!(0.8)
        } else if performance.win_rate >= dec!(0.6) {
            Decimal::ONE + (performance.win_rate - dec!(0.5)) * dec!(0.5)
        } else if performance.win_rate < dec!(0.4) {
            (performance.win_rate * dec!(1.5)).max(dec!(0.5))
        } else {
            Decimal::ONE
        };

        let trend_factor = Decimal::ONE + market.trend_strength.abs() * dec!(0.2);
        let optimal = Decimal::from(self.base_leverage) * volatility_factor * performance_factor * trend_factor;
        let (min, max) = self.leverage_bounds;
        optimal.round().to_u32().unwrap_or(min).clamp(min, max)
    }

    /// Smaller in high volatility, scaled by Sharpe ratio once there is history
    pub fn position_size_percent(&self, market: &MarketConditions, performance: &TradePerformance) -> Decimal {
        let volatility_factor = if market.volatility > dec!(0.08) {
            (Decimal::ONE - market.volatility * dec!(4)).max(dec!(0.4))
        } else {
            Decimal::ONE + (dec!(0.08) - market.volatility) * dec!(2)
        };

        let sharpe = performance.sharpe_ratio;
        let sharpe_factor = if !performance.has_history() {
            dec!(0.8)
        } else if sharpe > Decimal::ONE {
            (Decimal::ONE + (sharpe - Decimal::ONE) * dec!(0.25)).min(dec!(1.5))
        } else if sharpe < Decimal::ZERO {
            (dec!(0.8) + sharpe * dec!(0.1)).max(dec!(0.5))
        } else {
            Decimal::ONE
        };

        let (min, max) = self.position_size_bounds;
        (self.base_position_size_percent * volatility_factor * sharpe_factor)
            .round_dp(1)
            .clamp(min, max)
    }

    /// Wider in volatile markets and after a poor win rate
    pub fn stop_loss_percent(&self, market: &MarketConditions, performance: &TradePerformance) -> Decimal {
        let volatility_factor =
            (Decimal::ONE + (market.volatility - dec!(0.05)) * dec!(10)).clamp(dec!(0.5), dec!(2));

        let win_rate_factor = if !performance.has_history() {
            dec!(1.1)
        } else if performance.win_rate >= dec!(0.6) {
            dec!(0.9)
        } else if performance.win_rate < dec!(0.4) {
            dec!(1.2)
        } else {
            Decimal::ONE
        };

        let (min, max) = self.stop_loss_bounds;
        (self.base_stop_loss_percent * volatility_factor * win_rate_factor)
            .round_dp(1)
            .clamp(min, max)
    }

    /// Higher in strong trends, volatile markets and after large average wins
    pub fn take_profit_percent(
        &self,
        market: &MarketConditions,
        performance: &TradePerformance,
        stop_loss_percent: Decimal,
    ) -> Decimal {
        let trend_factor = Decimal::ONE + market.trend_strength.abs() * dec!(0.5);
        let profit_factor = if performance.has_history() && performance.avg_profit > Decimal::ZERO {
            (Decimal::ONE + performance.avg_profit / dec!(100)).min(dec!(1.5))
        } else {
            Decimal::ONE
        };
        let volatility_factor = if market.volatility > dec!(0.05) {
            Decimal::ONE + market.volatility * dec!(3)
        } else {
            Decimal::ONE
        };

        let optimal = (self.base_take_profit_percent * trend_factor * profit_factor * volatility_factor).round_dp(1);
        let (min, max) = self.take_profit_bounds;
        optimal
            .max(stop_loss_percent * self.min_reward_ratio)
            .clamp(min, max)
    }

    /// All four parameters for the given conditions
    pub fn calculate(&self, market: &MarketConditions, performance: &TradePerformance) -> RiskParameters {
        let stop_loss_percent = self.stop_loss_percent(market, performance);
        let parameters = RiskParameters {
            max_leverage: self.leverage(market, performance),
            max_position_size_percent: self.position_size_percent(market, performance),
            stop_loss_percent,
            take_profit_percent: self.take_profit_percent(market, performance, stop_loss_percent),
        };
        tracing::debug!(
            leverage = parameters.max_leverage,
            position_size = %parameters.max_position_size_percent,
            stop_loss = %parameters.stop_loss_percent,
            take_profit = %parameters.take_profit_percent,
            volatility = %market.volatility,
            trades = performance.total_trades,
            "Adaptive risk parameters"
        );
        parameters
    }
}
