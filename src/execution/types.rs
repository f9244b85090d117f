//! Execution types

use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Order direction on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that opens a position on `side`
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position on `side`
    pub fn closing(side: Side) -> Self {
        Self::opening(side.opposite())
    }

    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A market order to be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    /// Base units
    pub quantity: Decimal,
    pub leverage: u32,
    /// Only reduce an existing position
    pub reduce_only: bool,
    /// Last observed price, used for paper fills and slippage checks
    pub reference_price: Decimal,
}

/// Lifecycle of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum OrderState {
    /// Accepted, not yet filled
    Pending,
    /// Filled, possibly partially
    Filled {
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
    },
    /// Rejected by the exchange after acceptance
    Rejected { reason: String },
    Cancelled,
}

/// A fill (executed trade)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Authoritative position as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: Side,
    /// Base units, always positive
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: u32,
}

/// Execution gateway errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Network failure or server-side error, worth retrying
    #[error("Transient execution failure: {0}")]
    Transient(String),
    /// Call did not complete within the configured timeout
    #[error("Execution call timed out")]
    Timeout,
    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Exchange-side validation failure
    #[error("Order rejected: {0}")]
    OrderRejected(String),
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),
}

impl ExecutionError {
    /// Whether the failure should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::Transient(_) | ExecutionError::Timeout)
    }

    /// Whether the failure must halt the driver
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Authentication(_))
    }
}
