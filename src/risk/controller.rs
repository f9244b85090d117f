//! Risk controller
//!
//! Filters aggregated signals against portfolio state and sizes approved
//! entries. Exposure contracts through a step-function risk multiplier before
//! the hard pause thresholds are reached. In adaptive mode, sizing, leverage
//! and stop distances come from market conditions and recent performance,
//! still capped by the configured limits.

use super::adaptive::{AdaptiveRiskSettings, MarketConditions, RiskParameters, TradePerformance};
use super::{DecisionReason, PortfolioState, RiskDecision, RiskLimits};
use crate::config::RiskConfig;
use crate::position::Position;
use crate::signal::{AggregatedSignal, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Sizes and gates trade decisions
#[derive(Debug, Clone, Default)]
pub struct RiskController {
    limits: RiskLimits,
    adaptive: AdaptiveRiskSettings,
}

/// Limits in force for one decision
struct Effective {
    leverage_cap: u32,
    position_fraction: Decimal,
    stop_fraction: Decimal,
    target_fraction: Decimal,
}

impl RiskController {
    /// Create a new controller
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            adaptive: AdaptiveRiskSettings::default(),
        }
    }

    /// Create from RiskConfig
    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(RiskLimits::from_config(config))
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Shrink factor from losing streak and drawdown, in (0, 1]
    ///
    /// Halves once the streak reaches `loss_streak_reduction`, and halves
    /// again once drawdown reaches half the pause threshold.
    pub fn risk_multiplier(&self, portfolio: &PortfolioState) -> Decimal {
        let mut multiplier = Decimal::ONE;
        if self.limits.loss_streak_reduction > 0
            && portfolio.consecutive_losses >= self.limits.loss_streak_reduction
        {
            multiplier *= dec!(0.5);
        }
        if portfolio.drawdown() >= self.limits.drawdown_threshold / dec!(2) {
            multiplier *= dec!(0.5);
        }
        multiplier
    }

    /// Adaptive parameters for the current conditions, `None` in fixed mode
    pub fn parameters(
        &self,
        market: &MarketConditions,
        performance: &TradePerformance,
    ) -> Option<RiskParameters> {
        self.limits
            .adaptive_mode
            .then(|| self.adaptive.calculate(market, performance))
    }

    fn effective(&self, parameters: Option<&RiskParameters>) -> Effective {
        let limits = &self.limits;
        match parameters {
            Some(p) => Effective {
                leverage_cap: p.max_leverage.min(limits.max_leverage),
                position_fraction: (p.max_position_size_percent / dec!(100)).min(limits.max_position_fraction),
                stop_fraction: p.stop_loss_percent / dec!(100),
                target_fraction: p.take_profit_percent / dec!(100),
            },
            None => Effective {
                leverage_cap: limits.max_leverage,
                position_fraction: limits.max_position_fraction,
                stop_fraction: limits.stop_loss_fraction,
                target_fraction: limits.take_profit_fraction,
            },
        }
    }

    /// Leverage after capping and risk reduction, never below 1
    pub fn leverage(&self, recommended: Option<u32>, multiplier: Decimal) -> u32 {
        self.capped_leverage(recommended, multiplier, self.limits.max_leverage)
    }

    fn capped_leverage(&self, recommended: Option<u32>, multiplier: Decimal, cap: u32) -> u32 {
        let capped = recommended
            .unwrap_or(self.limits.default_leverage)
            .min(cap)
            .max(1);
        (Decimal::from(capped) * multiplier)
            .floor()
            .to_u32()
            .unwrap_or(1)
            .clamp(1, capped)
    }

    /// Absolute stop-loss and take-profit prices for an entry
    pub fn stop_prices(&self, side: Side, entry_price: Decimal, leverage: u32) -> (Decimal, Decimal) {
        self.offset_prices(
            side,
            entry_price,
            leverage,
            self.limits.stop_loss_fraction,
            self.limits.take_profit_fraction,
        )
    }

    fn offset_prices(
        &self,
        side: Side,
        entry_price: Decimal,
        leverage: u32,
        mut stop: Decimal,
        mut target: Decimal,
    ) -> (Decimal, Decimal) {
        if self.limits.scale_stops_by_leverage {
            let leverage = Decimal::from(leverage.max(1));
            stop /= leverage;
            target /= leverage;
        }
        match side {
            Side::Long => (
                entry_price * (Decimal::ONE - stop),
                entry_price * (Decimal::ONE + target),
            ),
            Side::Short => (
                entry_price * (Decimal::ONE + stop),
                entry_price * (Decimal::ONE - target),
            ),
        }
    }

    /// Decide whether and how to trade an aggregated signal under the fixed limits
    pub fn evaluate(
        &self,
        signal: &AggregatedSignal,
        portfolio: &PortfolioState,
        open_positions: &[Position],
    ) -> RiskDecision {
        self.evaluate_with(signal, portfolio, open_positions, None)
    }

    /// Decide with adaptive parameters when given, the fixed limits otherwise
    pub fn evaluate_with(
        &self,
        signal: &AggregatedSignal,
        portfolio: &PortfolioState,
        open_positions: &[Position],
        parameters: Option<&RiskParameters>,
    ) -> RiskDecision {
        let effective = self.effective(parameters);
        let symbol = signal.symbol.as_str();
        let Some(side) = signal.direction.side() else {
            return RiskDecision::rejected(symbol, None, DecisionReason::NeutralSignal);
        };
        if signal.price <= Decimal::ZERO {
            return RiskDecision::rejected(symbol, Some(side), DecisionReason::InvalidPrice);
        }

        let active: Vec<&Position> = open_positions
            .iter()
            .filter(|p| !p.status.is_terminal())
            .collect();
        if active.iter().any(|p| p.symbol == symbol) {
            return RiskDecision::rejected(symbol, Some(side), DecisionReason::PositionExists);
        }
        if portfolio.trading_paused {
            let reason = DecisionReason::TradingPaused(portfolio.pause_reason());
            return RiskDecision::rejected(symbol, Some(side), reason);
        }
        if self.limits.max_open_positions > 0 && active.len() >= self.limits.max_open_positions {
            return RiskDecision::rejected(symbol, Some(side), DecisionReason::MaxOpenPositions);
        }

        let multiplier = self.risk_multiplier(portfolio);
        let strength_factor = if self.limits.reference_strength > Decimal::ZERO {
            (signal.strength / self.limits.reference_strength).min(Decimal::ONE)
        } else {
            Decimal::ONE
        };
        let base_size = effective.position_fraction * portfolio.equity.max(Decimal::ZERO);
        let size = (base_size * multiplier * strength_factor)
            .round_dp_with_strategy(self.limits.size_decimals, RoundingStrategy::ToZero);
        let quantity = (size / signal.price)
            .round_dp_with_strategy(self.limits.quantity_decimals, RoundingStrategy::ToZero);
        if size <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return RiskDecision::rejected(symbol, Some(side), DecisionReason::SizeTooSmall);
        }

        let leverage = self.capped_leverage(signal.recommended_leverage(), multiplier, effective.leverage_cap);
        let (stop_loss_price, take_profit_price) = self.offset_prices(
            side,
            signal.price,
            leverage,
            effective.stop_fraction,
            effective.target_fraction,
        );

        tracing::debug!(
            symbol,
            ?side,
            size = %size,
            leverage,
            multiplier = %multiplier,
            adaptive = parameters.is_some(),
            "Decision approved"
        );

        RiskDecision {
            approved: true,
            symbol: symbol.to_string(),
            side: Some(side),
            size,
            quantity,
            leverage,
            entry_price: signal.price,
            stop_loss_price,
            take_profit_price,
            reason: DecisionReason::Approved,
            supporting_strategies: signal.supporting_strategies(side.direction()),
        }
    }
}
