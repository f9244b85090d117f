//! Execution gateway module
//!
//! Order submission, status queries and position reconciliation against the
//! exchange

mod paper;
mod retry;
mod types;

pub use paper::PaperGateway;
pub use retry::{RetryPolicy, Retryable};
pub use types::{
    ExchangePosition, ExecutionError, Fill, OrderId, OrderRequest, OrderSide, OrderState,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for exchange gateways
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit a market order
    async fn submit_order(&self, order: OrderRequest) -> Result<OrderId, ExecutionError>;
    /// Cancel an order; false if it had already filled
    async fn cancel_order(&self, id: OrderId) -> Result<bool, ExecutionError>;
    /// Current state of a submitted order
    async fn order_status(&self, id: OrderId) -> Result<OrderState, ExecutionError>;
    /// Authoritative position for a symbol, if any
    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExecutionError>;
    /// Account equity in quote currency
    async fn get_balance(&self) -> Result<Decimal, ExecutionError>;
}
