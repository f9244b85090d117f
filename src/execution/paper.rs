//! Paper trading gateway
//!
//! Fills every order immediately at the reference price moved against the
//! taker by `slippage`, charges `fee_rate` on notional, and nets positions
//! per symbol. Realized PnL and fees settle into the balance.

use super::{
    ExchangePosition, ExecutionError, ExecutionGateway, Fill, OrderId, OrderRequest, OrderState,
};
use crate::config::ExecutionConfig;
use crate::signal::Side;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Book {
    balance: Decimal,
    orders: HashMap<OrderId, OrderState>,
    /// Signed base quantity and average entry per symbol
    positions: HashMap<String, (Decimal, Decimal, u32)>,
    fills: Vec<Fill>,
}

/// Paper trading gateway with simulated fills
pub struct PaperGateway {
    fee_rate: Decimal,
    slippage: Decimal,
    book: Arc<RwLock<Book>>,
}

impl PaperGateway {
    /// Create a new paper gateway
    pub fn new(initial_balance: Decimal, fee_rate: Decimal, slippage: Decimal) -> Self {
        Self {
            fee_rate,
            slippage,
            book: Arc::new(RwLock::new(Book {
                balance: initial_balance,
                ..Book::default()
            })),
        }
    }

    /// Create from ExecutionConfig
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.initial_balance, config.fee_rate, config.slippage)
    }

    /// All fills so far
    pub async fn fills(&self) -> Vec<Fill> {
        self.book.read().await.fills.clone()
    }

    fn fill_price(&self, order: &OrderRequest) -> Decimal {
        order.reference_price * (Decimal::ONE + order.side.sign() * self.slippage)
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: OrderRequest) -> Result<OrderId, ExecutionError> {
        if order.quantity <= Decimal::ZERO {
            return Err(ExecutionError::OrderRejected("quantity must be positive".into()));
        }
        if order.reference_price <= Decimal::ZERO {
            return Err(ExecutionError::OrderRejected("no reference price".into()));
        }

        let mut book = self.book.write().await;
        let (current, entry, leverage) = book
            .positions
            .get(&order.symbol)
            .copied()
            .unwrap_or((Decimal::ZERO, Decimal::ZERO, order.leverage));

        let delta = order.side.sign() * order.quantity;
        let reducing = !current.is_zero() && current.is_sign_positive() != delta.is_sign_positive();
        if order.reduce_only && (!reducing || order.quantity > current.abs()) {
            return Err(ExecutionError::OrderRejected("reduce-only order would increase position".into()));
        }

        let price = self.fill_price(&order);
        let fee = price * order.quantity * self.fee_rate;
        let order_id = OrderId::new_v4();

        let next = current + delta;
        let (next_entry, realized) = if reducing {
            let closed = order.quantity.min(current.abs());
            let direction = if current.is_sign_negative() {
                Decimal::NEGATIVE_ONE
            } else {
                Decimal::ONE
            };
            let realized = (price - entry) * closed * direction;
            // Flipping through zero opens the remainder at the fill price
            let entry = if next.is_zero() {
                Decimal::ZERO
            } else if next.is_sign_positive() == current.is_sign_positive() {
                entry
            } else {
                price
            };
            (entry, realized)
        } else {
            let entry = (entry * current.abs() + price * order.quantity) / next.abs();
            (entry, Decimal::ZERO)
        };

        book.balance += realized - fee;
        if next.is_zero() {
            book.positions.remove(&order.symbol);
        } else {
            book.positions
                .insert(order.symbol.clone(), (next, next_entry, order.leverage.max(leverage)));
        }
        book.orders.insert(
            order_id,
            OrderState::Filled {
                price,
                quantity: order.quantity,
                fee,
            },
        );
        book.fills.push(Fill {
            order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity: order.quantity,
            fee,
            timestamp: Utc::now(),
        });

        tracing::info!(
            %order_id,
            symbol = %order.symbol,
            side = ?order.side,
            price = %price,
            quantity = %order.quantity,
            "Paper order filled"
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<bool, ExecutionError> {
        let mut book = self.book.write().await;
        match book.orders.get_mut(&id) {
            Some(state @ OrderState::Pending) => {
                *state = OrderState::Cancelled;
                tracing::info!(%id, "Paper order cancelled");
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ExecutionError::UnknownOrder(id)),
        }
    }

    async fn order_status(&self, id: OrderId) -> Result<OrderState, ExecutionError> {
        self.book
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(ExecutionError::UnknownOrder(id))
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExecutionError> {
        let book = self.book.read().await;
        Ok(book
            .positions
            .get(symbol)
            .map(|(quantity, entry_price, leverage)| ExchangePosition {
                symbol: symbol.to_string(),
                side: if quantity.is_sign_positive() {
                    Side::Long
                } else {
                    Side::Short
                },
                quantity: quantity.abs(),
                entry_price: *entry_price,
                leverage: *leverage,
            }))
    }

    async fn get_balance(&self) -> Result<Decimal, ExecutionError> {
        Ok(self.book.read().await.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderSide;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn order(side: OrderSide, quantity: Decimal, price: Decimal, reduce_only: bool) -> OrderRequest {
        OrderRequest {
            symbol: "XBTUSDTM".to_string(),
            side,
            quantity,
            leverage: 5,
            reduce_only,
            reference_price: price,
        }
    }

    #[tokio::test]
    async fn test_paper_gateway_fill() {
        let gateway = PaperGateway::new(dec!(10000), dec!(0.001), dec!(0));

        let order_id = assert_ok!(gateway.submit_order(order(OrderSide::Buy, dec!(2), dec!(100), false)).await);
        let state = gateway.order_status(order_id).await.unwrap();
        assert_eq!(
            state,
            OrderState::Filled {
                price: dec!(100),
                quantity: dec!(2),
                fee: dec!(0.2),
            }
        );

        let position = gateway.get_position("XBTUSDTM").await.unwrap().unwrap();
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(gateway.get_balance().await.unwrap(), dec!(9999.8));
    }

    #[tokio::test]
    async fn test_round_trip_settles_pnl() {
        let gateway = PaperGateway::new(dec!(1000), dec!(0), dec!(0));
        gateway
            .submit_order(order(OrderSide::Sell, dec!(1), dec!(100), false))
            .await
            .unwrap();
        gateway
            .submit_order(order(OrderSide::Buy, dec!(1), dec!(90), true))
            .await
            .unwrap();

        assert!(gateway.get_position("XBTUSDTM").await.unwrap().is_none());
        assert_eq!(gateway.get_balance().await.unwrap(), dec!(1010));
        assert_eq!(gateway.fills().await.len(), 2);
    }

    #[tokio::test]
    async fn test_slippage_moves_against_taker() {
        let gateway = PaperGateway::new(dec!(1000), dec!(0), dec!(0.01));
        let id = gateway
            .submit_order(order(OrderSide::Buy, dec!(1), dec!(100), false))
            .await
            .unwrap();
        match gateway.order_status(id).await.unwrap() {
            OrderState::Filled { price, .. } => assert_eq!(price, dec!(101)),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_rejected() {
        let gateway = PaperGateway::new(dec!(1000), dec!(0), dec!(0));
        let result = gateway
            .submit_order(order(OrderSide::Sell, dec!(1), dec!(100), true))
            .await;
        assert!(matches!(assert_err!(result), ExecutionError::OrderRejected(_)));
    }

    #[tokio::test]
    async fn test_cancel_filled_and_unknown() {
        let gateway = PaperGateway::new(dec!(1000), dec!(0), dec!(0));
        let id = gateway
            .submit_order(order(OrderSide::Buy, dec!(1), dec!(100), false))
            .await
            .unwrap();
        assert!(!gateway.cancel_order(id).await.unwrap());
        assert!(gateway.cancel_order(OrderId::new_v4()).await.is_err());
    }
}
