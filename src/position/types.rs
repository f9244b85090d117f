//! Position types and state machine

use crate::execution::{ExecutionError, OrderId};
use crate::risk::RiskDecision;
use crate::signal::{Side, StrategyId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Position lifecycle
///
/// Opening -> Open -> Closing -> Closed, or Opening -> Cancelled. A failed
/// close returns Closing -> Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// Entry order submitted
    Opening,
    /// Entry fill confirmed
    Open,
    /// Close order submitted
    Closing,
    /// Close fill confirmed
    Closed,
    /// Entry never filled
    Cancelled,
}

impl PositionStatus {
    /// Closed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Cancelled)
    }

    /// Whether `next` is a legal successor
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Opening, Open) | (Opening, Cancelled) | (Open, Closing) | (Closing, Closed) | (Closing, Open)
        )
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// A stop or target crossed by the current price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureEvent {
    pub position_id: Uuid,
    pub symbol: String,
    pub reason: ExitReason,
    pub trigger_price: Decimal,
}

/// A tracked position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    /// Notional in quote currency
    pub size: Decimal,
    /// Base units
    pub quantity: Decimal,
    pub leverage: u32,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub entry_order_id: Option<OrderId>,
    pub exit_order_id: Option<OrderId>,
    pub exit_reason: Option<ExitReason>,
    /// Strategies credited with the outcome
    pub supporting_strategies: Vec<StrategyId>,
    /// Close orders submitted so far
    pub close_attempts: u32,
    /// Fees paid so far
    pub fees: Decimal,
    /// PnL already realized by partial closes
    pub realized_pnl: Decimal,
    /// Fees and partial-close PnL already applied to portfolio equity
    #[serde(default)]
    pub booked_pnl: Decimal,
    /// Mark-to-market PnL at the last observed price
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Create an Opening position from an approved decision
    pub fn from_decision(decision: &RiskDecision, now: DateTime<Utc>) -> Result<Self, PositionError> {
        let side = match (decision.approved, decision.side) {
            (true, Some(side)) => side,
            _ => return Err(PositionError::NotApproved(decision.symbol.clone())),
        };
        Ok(Self {
            id: Uuid::new_v4(),
            symbol: decision.symbol.clone(),
            side,
            entry_price: decision.entry_price,
            size: decision.size,
            quantity: decision.quantity,
            leverage: decision.leverage,
            stop_loss_price: decision.stop_loss_price,
            take_profit_price: decision.take_profit_price,
            opened_at: now,
            status: PositionStatus::Opening,
            entry_order_id: None,
            exit_order_id: None,
            exit_reason: None,
            supporting_strategies: decision.supporting_strategies.clone(),
            close_attempts: 0,
            fees: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            booked_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        })
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), PositionError> {
        if !self.status.can_transition_to(next) {
            return Err(PositionError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        tracing::info!(
            position_id = %self.id,
            symbol = %self.symbol,
            from = ?self.status,
            to = ?next,
            "Position transition"
        );
        self.status = next;
        Ok(())
    }

    /// PnL of closing `quantity` at `price`, before fees
    pub fn pnl_at(&self, price: Decimal, quantity: Decimal) -> Decimal {
        (price - self.entry_price) * quantity * self.side.sign()
    }

    /// Refresh mark-to-market PnL
    pub fn mark(&mut self, price: Decimal) {
        if matches!(self.status, PositionStatus::Open | PositionStatus::Closing) {
            self.unrealized_pnl = self.pnl_at(price, self.quantity);
        }
    }
}

/// Compare `price` with the position's stop and target
///
/// Long: stop when price <= stop, target when price >= target. Short is
/// inverted. The stop is checked first, so it wins a simultaneous crossing.
pub fn crossed_threshold(position: &Position, price: Decimal) -> Option<ExitReason> {
    let (stop_hit, target_hit) = match position.side {
        Side::Long => (
            price <= position.stop_loss_price,
            price >= position.take_profit_price,
        ),
        Side::Short => (
            price >= position.stop_loss_price,
            price <= position.take_profit_price,
        ),
    };
    if stop_hit {
        Some(ExitReason::StopLoss)
    } else if target_hit {
        Some(ExitReason::TakeProfit)
    } else {
        None
    }
}

/// Closure check for an Open position; unfilled positions are never monitored
pub fn monitor(position: &Position, current_price: Decimal) -> Option<ClosureEvent> {
    if position.status != PositionStatus::Open {
        return None;
    }
    crossed_threshold(position, current_price).map(|reason| ClosureEvent {
        position_id: position.id,
        symbol: position.symbol.clone(),
        reason,
        trigger_price: current_price,
    })
}

/// An archived position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    /// None for cancelled entries
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    /// Net of fees
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    /// Whether this trade counts toward performance
    pub fn is_closed(&self) -> bool {
        self.position.status == PositionStatus::Closed
    }
}

/// Aggregate statistics over closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: Decimal,
    pub average_pnl: Decimal,
    pub win_rate: Decimal,
}

/// Position management errors
#[derive(Debug, Error)]
pub enum PositionError {
    /// A non-terminal position already exists for the symbol
    #[error("Position already active for {0}")]
    AlreadyActive(String),
    #[error("Trading paused")]
    TradingPaused,
    #[error("Decision for {0} was not approved")]
    NotApproved(String),
    #[error("Invalid transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
    },
    #[error("No position for {0}")]
    NotFound(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl PositionError {
    /// Whether the failure must halt the driver
    pub fn is_fatal(&self) -> bool {
        matches!(self, PositionError::Execution(e) if e.is_fatal())
    }
}
