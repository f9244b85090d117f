//! Risk management types

use crate::signal::{Side, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Condition that pauses new entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Drawdown from peak at or beyond the threshold
    Drawdown,
    /// Losing streak at or beyond the limit
    ConsecutiveLosses,
    /// Realized loss for the day at or beyond the limit
    DailyLoss,
}

/// Why a decision was approved or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Approved,
    NeutralSignal,
    PositionExists,
    /// Paused, with the first active trigger
    TradingPaused(Option<PauseReason>),
    MaxOpenPositions,
    SizeTooSmall,
    InvalidPrice,
}

/// Output of the risk controller for one aggregated signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    pub symbol: String,
    /// Side to open; None on rejections before a direction is known
    pub side: Option<Side>,
    /// Notional in quote currency
    pub size: Decimal,
    /// Base units to order
    pub quantity: Decimal,
    pub leverage: u32,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub reason: DecisionReason,
    /// Strategies whose contribution agreed with `side`
    pub supporting_strategies: Vec<StrategyId>,
}

impl RiskDecision {
    /// A rejection carrying no order parameters
    pub fn rejected(symbol: impl Into<String>, side: Option<Side>, reason: DecisionReason) -> Self {
        Self {
            approved: false,
            symbol: symbol.into(),
            side,
            size: Decimal::ZERO,
            quantity: Decimal::ZERO,
            leverage: 0,
            entry_price: Decimal::ZERO,
            stop_loss_price: Decimal::ZERO,
            take_profit_price: Decimal::ZERO,
            reason,
            supporting_strategies: vec![],
        }
    }
}
