//! Position manager
//!
//! Drives positions through their lifecycle against an execution gateway.
//! Risk evaluation and the Opening reservation happen under one lock so two
//! concurrent decisions for a symbol cannot both open. Gateway calls run
//! outside the lock.

use super::{
    crossed_threshold, monitor, ClosedTrade, ClosureEvent, PerformanceStats, Position,
    PositionBook, PositionError, PositionStatus,
};
use crate::execution::{
    ExecutionError, ExecutionGateway, OrderId, OrderRequest, OrderSide, OrderState, RetryPolicy,
};
use crate::risk::{
    MarketConditions, PortfolioState, RiskController, RiskDecision, TradePerformance,
    PERFORMANCE_WINDOW,
};
use crate::signal::AggregatedSignal;
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// State guarded by the manager lock
#[derive(Debug)]
struct Ledger {
    portfolio: PortfolioState,
    book: PositionBook,
    /// Closed trades not yet reported to strategies
    unreported: Vec<ClosedTrade>,
}

impl Ledger {
    fn cancel_entry(&mut self, symbol: &str, reason: &str, now: DateTime<Utc>) -> Option<Position> {
        let position = self.book.get_mut(symbol)?;
        if position.status != PositionStatus::Opening {
            return None;
        }
        if let Err(e) = position.transition(PositionStatus::Cancelled) {
            tracing::error!(error = %e, "Cancel rejected by state machine");
            return None;
        }
        tracing::warn!(symbol, reason, position_id = %position.id, "Entry cancelled");
        let position = position.clone();
        self.book.archive(ClosedTrade {
            position: position.clone(),
            exit_price: None,
            exit_reason: None,
            realized_pnl: Decimal::ZERO,
            fees: position.fees,
            closed_at: now,
        });
        increment_counter(CounterMetric::PositionCancelled);
        Some(position)
    }

    fn revert_close(&mut self, symbol: &str, reason: &str) {
        let Some(position) = self.book.get_mut(symbol) else {
            return;
        };
        if position.status != PositionStatus::Closing {
            return;
        }
        position.exit_order_id = None;
        if let Err(e) = position.transition(PositionStatus::Open) {
            tracing::error!(error = %e, "Close revert rejected by state machine");
            return;
        }
        increment_counter(CounterMetric::CloseFailed);
        tracing::warn!(
            symbol,
            reason,
            attempts = position.close_attempts,
            "Close failed, position stays open"
        );
    }

    /// Settle a fully closed position into the portfolio
    fn settle(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        risk: &RiskController,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedTrade>, PositionError> {
        let Some(position) = self.book.get_mut(symbol) else {
            return Ok(None);
        };
        position.transition(PositionStatus::Closed)?;
        position.unrealized_pnl = Decimal::ZERO;
        let realized_pnl = position.realized_pnl - position.fees;
        let trade = ClosedTrade {
            position: position.clone(),
            exit_price: Some(exit_price),
            exit_reason: position.exit_reason,
            realized_pnl,
            fees: position.fees,
            closed_at: now,
        };

        tracing::info!(
            symbol,
            position_id = %trade.position.id,
            exit_price = %exit_price,
            reason = ?trade.exit_reason,
            pnl = %realized_pnl,
            "Position closed"
        );
        increment_counter(CounterMetric::PositionClosed);

        self.portfolio
            .apply_closed_trade(realized_pnl, trade.position.booked_pnl, risk.limits(), now);
        self.book.archive(trade.clone());
        self.unreported.push(trade.clone());
        Ok(Some(trade))
    }
}

/// What check_exits decided under the lock
enum ExitAction {
    Close(ClosureEvent, OrderRequest),
    CancelEntry(OrderId),
}

/// Owns positions and portfolio state
pub struct PositionManager {
    gateway: Arc<dyn ExecutionGateway>,
    risk: RiskController,
    retry: RetryPolicy,
    ledger: Arc<Mutex<Ledger>>,
}

impl PositionManager {
    /// Create a new position manager
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        risk: RiskController,
        retry: RetryPolicy,
        portfolio: PortfolioState,
        history_len: usize,
    ) -> Self {
        Self {
            gateway,
            risk,
            retry,
            ledger: Arc::new(Mutex::new(Ledger {
                portfolio,
                book: PositionBook::new(history_len),
                unreported: Vec::new(),
            })),
        }
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    /// Current portfolio state
    pub async fn portfolio(&self) -> PortfolioState {
        self.ledger.lock().await.portfolio.clone()
    }

    /// Replace portfolio state, e.g. from a persisted snapshot
    pub async fn restore_portfolio(&self, portfolio: PortfolioState) {
        self.ledger.lock().await.portfolio = portfolio;
    }

    /// Re-adopt persisted positions that still exist on the exchange
    ///
    /// Each position is checked with `get_position`. A matching exchange
    /// position resumes as Open with the exchange quantity and entry, keeping
    /// the persisted stop and target. Anything else is dropped. Returns the
    /// number of positions resumed.
    pub async fn restore_positions(&self, positions: Vec<Position>) -> Result<usize, PositionError> {
        let mut restored = 0;
        for mut position in positions.into_iter().filter(|p| !p.status.is_terminal()) {
            let symbol = position.symbol.clone();
            let exchange = match self
                .retry
                .run("get_position", || self.gateway.get_position(&symbol))
                .await
            {
                Ok(exchange) => exchange,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Cannot verify persisted position, dropping it");
                    continue;
                }
            };
            let Some(found) = exchange.filter(|p| p.side == position.side) else {
                tracing::warn!(symbol = %symbol, position_id = %position.id, "Persisted position gone from exchange");
                continue;
            };

            position.quantity = found.quantity;
            position.entry_price = found.entry_price;
            position.size = found.quantity * found.entry_price;
            position.status = PositionStatus::Open;
            position.entry_order_id = None;
            position.exit_order_id = None;
            position.exit_reason = None;
            position.unrealized_pnl = Decimal::ZERO;

            let mut ledger = self.ledger.lock().await;
            match ledger.book.insert(position) {
                Ok(()) => {
                    restored += 1;
                    tracing::info!(symbol = %symbol, quantity = %found.quantity, "Resumed persisted position");
                }
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Persisted position not resumed"),
            }
        }
        Ok(restored)
    }

    /// Non-terminal positions
    pub async fn positions(&self) -> Vec<Position> {
        self.ledger.lock().await.book.active().cloned().collect()
    }

    /// Non-terminal position for a symbol
    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.ledger.lock().await.book.get(symbol).cloned()
    }

    /// Archived positions, oldest first
    pub async fn history(&self) -> Vec<ClosedTrade> {
        self.ledger.lock().await.book.history().cloned().collect()
    }

    pub async fn performance(&self) -> PerformanceStats {
        self.ledger.lock().await.book.performance()
    }

    pub async fn unrealized_pnl(&self) -> Decimal {
        self.ledger.lock().await.book.unrealized_pnl()
    }

    /// Take closed trades whose outcomes have not been reported yet
    pub async fn drain_closed(&self) -> Vec<ClosedTrade> {
        std::mem::take(&mut self.ledger.lock().await.unreported)
    }

    /// Roll the trading day and refresh time-based pause triggers
    pub async fn roll_day(&self, now: DateTime<Utc>) -> bool {
        let mut ledger = self.ledger.lock().await;
        let rolled = ledger.portfolio.roll_day(self.risk.limits(), now);
        ledger.portfolio.reevaluate(self.risk.limits(), now);
        rolled
    }

    /// Adopt the exchange balance as equity
    pub async fn reconcile_balance(&self, now: DateTime<Utc>) -> Result<Decimal, PositionError> {
        let balance = self
            .retry
            .run("get_balance", || self.gateway.get_balance())
            .await?;
        self.ledger
            .lock()
            .await
            .portfolio
            .reconcile_equity(balance, self.risk.limits(), now);
        Ok(balance)
    }

    /// Evaluate an aggregated signal and open a position if approved
    ///
    /// Returns the decision. Rejections are not errors.
    pub async fn evaluate_and_open(
        &self,
        signal: &AggregatedSignal,
        now: DateTime<Utc>,
    ) -> Result<RiskDecision, PositionError> {
        self.evaluate_and_open_with(signal, &MarketConditions::default(), now)
            .await
    }

    /// Like [`Self::evaluate_and_open`], sizing from market conditions and
    /// recent trade performance when adaptive mode is on
    pub async fn evaluate_and_open_with(
        &self,
        signal: &AggregatedSignal,
        market: &MarketConditions,
        now: DateTime<Utc>,
    ) -> Result<RiskDecision, PositionError> {
        let (decision, position) = {
            let mut ledger = self.ledger.lock().await;
            ledger.portfolio.reevaluate(self.risk.limits(), now);
            let parameters = if self.risk.limits().adaptive_mode {
                let mut results: Vec<Decimal> = ledger
                    .book
                    .history()
                    .rev()
                    .take(PERFORMANCE_WINDOW)
                    .map(|t| t.realized_pnl)
                    .collect();
                results.reverse();
                self.risk
                    .parameters(market, &TradePerformance::from_results(&results))
            } else {
                None
            };
            let active: Vec<Position> = ledger.book.active().cloned().collect();
            let decision =
                self.risk
                    .evaluate_with(signal, &ledger.portfolio, &active, parameters.as_ref());
            if !decision.approved {
                increment_counter(CounterMetric::DecisionRejected);
                tracing::debug!(symbol = %decision.symbol, reason = ?decision.reason, "Decision rejected");
                return Ok(decision);
            }
            let position = Position::from_decision(&decision, now)?;
            ledger.book.insert(position.clone())?;
            (decision, position)
        };

        increment_counter(CounterMetric::DecisionApproved);
        self.submit_entry(position, now).await?;
        Ok(decision)
    }

    /// Open a position for an approved decision
    pub async fn open(
        &self,
        decision: &RiskDecision,
        now: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        let position = {
            let mut ledger = self.ledger.lock().await;
            if ledger.portfolio.trading_paused {
                return Err(PositionError::TradingPaused);
            }
            let position = Position::from_decision(decision, now)?;
            ledger.book.insert(position.clone())?;
            position
        };
        self.submit_entry(position, now).await
    }

    async fn submit_entry(
        &self,
        position: Position,
        now: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        let symbol = position.symbol.clone();
        let symbol = symbol.as_str();
        let id = position.id;
        let order = OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::opening(position.side),
            quantity: position.quantity,
            leverage: position.leverage,
            reduce_only: false,
            reference_price: position.entry_price,
        };

        let started = Instant::now();
        let result = self
            .retry
            .run("submit_order", || self.gateway.submit_order(order.clone()))
            .await;
        record_latency(LatencyMetric::OrderSubmission, started.elapsed());

        match result {
            Ok(order_id) => {
                if let Some(p) = self.ledger.lock().await.book.get_mut(symbol) {
                    p.entry_order_id = Some(order_id);
                }
                tracing::info!(
                    symbol,
                    %order_id,
                    side = ?position.side,
                    quantity = %position.quantity,
                    leverage = position.leverage,
                    "Entry order submitted"
                );
                self.sync_order(order_id, now).await?;
            }
            Err(e) if e.is_transient() => {
                // Outcome unknown; the next poll checks the exchange position
                tracing::warn!(symbol, error = %e, "Entry submission unconfirmed");
            }
            Err(e) => {
                self.ledger
                    .lock()
                    .await
                    .cancel_entry(symbol, &e.to_string(), now);
                return Err(e.into());
            }
        }

        let ledger = self.ledger.lock().await;
        let current = ledger
            .book
            .get(symbol)
            .filter(|p| p.id == id)
            .or_else(|| {
                ledger
                    .book
                    .history()
                    .rev()
                    .map(|t| &t.position)
                    .find(|p| p.id == id)
            })
            .cloned()
            .unwrap_or(position);
        Ok(current)
    }

    /// Mark a position to market and act on a crossed stop or target
    ///
    /// An Open position is closed with a reduce-only order. An Opening
    /// position whose entry would already be stopped out or at target is
    /// cancelled instead.
    pub async fn check_exits(
        &self,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosureEvent>, PositionError> {
        let action = {
            let mut ledger = self.ledger.lock().await;
            let Some(position) = ledger.book.get_mut(symbol) else {
                return Ok(None);
            };
            position.mark(price);
            match position.status {
                PositionStatus::Open => {
                    let Some(event) = monitor(position, price) else {
                        return Ok(None);
                    };
                    position.transition(PositionStatus::Closing)?;
                    position.exit_reason = Some(event.reason);
                    position.close_attempts += 1;
                    let order = OrderRequest {
                        symbol: symbol.to_string(),
                        side: OrderSide::closing(position.side),
                        quantity: position.quantity,
                        leverage: position.leverage,
                        reduce_only: true,
                        reference_price: price,
                    };
                    ExitAction::Close(event, order)
                }
                PositionStatus::Opening => match (position.entry_order_id, crossed_threshold(position, price)) {
                    (Some(order_id), Some(_)) => ExitAction::CancelEntry(order_id),
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            }
        };

        match action {
            ExitAction::Close(event, order) => {
                tracing::info!(
                    symbol,
                    reason = ?event.reason,
                    trigger_price = %event.trigger_price,
                    "Closure triggered"
                );
                self.submit_close(&event, order, now).await?;
                Ok(Some(event))
            }
            ExitAction::CancelEntry(order_id) => {
                match self
                    .retry
                    .run("cancel_order", || self.gateway.cancel_order(order_id))
                    .await
                {
                    Ok(true) => {
                        self.ledger.lock().await.cancel_entry(
                            symbol,
                            "closure condition before fill",
                            now,
                        );
                    }
                    // Already final; let the status decide
                    Ok(false) => {
                        self.sync_order(order_id, now).await?;
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => tracing::warn!(symbol, error = %e, "Entry cancel failed"),
                }
                Ok(None)
            }
        }
    }

    async fn submit_close(
        &self,
        event: &ClosureEvent,
        order: OrderRequest,
        now: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        let symbol = event.symbol.as_str();
        let started = Instant::now();
        let result = self
            .retry
            .run("submit_order", || self.gateway.submit_order(order.clone()))
            .await;
        record_latency(LatencyMetric::OrderSubmission, started.elapsed());

        match result {
            Ok(order_id) => {
                if let Some(p) = self.ledger.lock().await.book.get_mut(symbol) {
                    p.exit_order_id = Some(order_id);
                }
                self.sync_order(order_id, now).await?;
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.ledger.lock().await.revert_close(symbol, &e.to_string());
                Err(e.into())
            }
            Err(e) => {
                // A rejected reduce-only order may mean the exchange position is already gone
                match self
                    .retry
                    .run("get_position", || self.gateway.get_position(symbol))
                    .await
                {
                    Ok(None) => {
                        tracing::warn!(symbol, error = %e, "Exchange reports no position, settling locally");
                        let mut ledger = self.ledger.lock().await;
                        if let Some(p) = ledger.book.get_mut(symbol) {
                            let pnl = p.pnl_at(event.trigger_price, p.quantity);
                            p.realized_pnl += pnl;
                        }
                        ledger.settle(symbol, event.trigger_price, &self.risk, now)?;
                    }
                    Err(lookup) if lookup.is_fatal() => {
                        self.ledger.lock().await.revert_close(symbol, &e.to_string());
                        return Err(lookup.into());
                    }
                    _ => self.ledger.lock().await.revert_close(symbol, &e.to_string()),
                }
                Ok(())
            }
        }
    }

    /// Query an order and route the result to the confirm/fail handlers
    async fn sync_order(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedTrade>, PositionError> {
        let state = match self
            .retry
            .run("order_status", || self.gateway.order_status(order_id))
            .await
        {
            Ok(state) => state,
            Err(ExecutionError::UnknownOrder(_)) => OrderState::Rejected {
                reason: "unknown order".to_string(),
            },
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "Order status unavailable");
                return Ok(None);
            }
        };

        match state {
            OrderState::Pending => Ok(None),
            OrderState::Filled {
                price,
                quantity,
                fee,
            } => self.on_execution_confirmed(order_id, price, quantity, fee, now).await,
            OrderState::Rejected { reason } => {
                self.on_execution_failed(order_id, &reason, now).await?;
                Ok(None)
            }
            OrderState::Cancelled => {
                self.on_execution_failed(order_id, "cancelled", now).await?;
                Ok(None)
            }
        }
    }

    /// Apply a fill for an entry or close order
    ///
    /// The exchange position is authoritative: a partial entry fill shrinks
    /// the position, and a partial close leaves the residual Open.
    pub async fn on_execution_confirmed(
        &self,
        order_id: OrderId,
        fill_price: Decimal,
        fill_quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosedTrade>, PositionError> {
        let Some((symbol, is_entry)) = self.ledger.lock().await.book.find_order(order_id) else {
            tracing::debug!(%order_id, "Fill for untracked order");
            return Ok(None);
        };

        let exchange = match self
            .retry
            .run("get_position", || self.gateway.get_position(&symbol))
            .await
        {
            Ok(position) => Some(position),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Position reconciliation unavailable, using fill");
                None
            }
        };

        let mut guard = self.ledger.lock().await;
        let ledger = &mut *guard;
        let Some(position) = ledger.book.get_mut(&symbol) else {
            return Ok(None);
        };
        let exchange_quantity = exchange.map(|p| {
            p.filter(|p| p.side == position.side)
                .map(|p| (p.quantity, p.entry_price))
        });

        if is_entry {
            if position.status != PositionStatus::Opening {
                return Ok(None);
            }
            let (quantity, entry_price) = match exchange_quantity {
                Some(Some(found)) => found,
                _ => (fill_quantity, fill_price),
            };
            if quantity < position.quantity {
                tracing::info!(
                    symbol = %symbol,
                    requested = %position.quantity,
                    filled = %quantity,
                    "Partial entry fill"
                );
            }
            position.quantity = quantity;
            position.entry_price = entry_price;
            position.size = quantity * entry_price;
            position.fees += fee;
            position.booked_pnl -= fee;
            position.transition(PositionStatus::Open)?;
            increment_counter(CounterMetric::PositionOpened);
            ledger.portfolio.apply_interim(-fee, self.risk.limits(), now);
            return Ok(None);
        }

        if position.status != PositionStatus::Closing {
            return Ok(None);
        }
        let residual = match exchange_quantity {
            Some(Some((quantity, _))) => quantity.min(position.quantity),
            Some(None) => Decimal::ZERO,
            None => (position.quantity - fill_quantity).max(Decimal::ZERO),
        };
        let closed_quantity = position.quantity - residual;
        let pnl = position.pnl_at(fill_price, closed_quantity);
        position.realized_pnl += pnl;
        position.fees += fee;

        if residual > Decimal::ZERO {
            position.quantity = residual;
            position.size = residual * position.entry_price;
            position.exit_order_id = None;
            position.booked_pnl += pnl - fee;
            position.transition(PositionStatus::Open)?;
            tracing::warn!(symbol = %symbol, residual = %residual, "Partial close, residual stays open");
            ledger.portfolio.apply_interim(pnl - fee, self.risk.limits(), now);
            return Ok(None);
        }

        ledger.settle(&symbol, fill_price, &self.risk, now)
    }

    /// Handle a rejected or cancelled order
    ///
    /// A failed entry cancels the position; a failed close leaves it Open.
    pub async fn on_execution_failed(
        &self,
        order_id: OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        let mut ledger = self.ledger.lock().await;
        match ledger.book.find_order(order_id) {
            Some((symbol, true)) => {
                ledger.cancel_entry(&symbol, reason, now);
            }
            Some((symbol, false)) => ledger.revert_close(&symbol, reason),
            None => tracing::debug!(%order_id, reason, "Failure for untracked order"),
        }
        Ok(())
    }

    /// Resolve every in-flight order
    pub async fn poll_executions(&self, now: DateTime<Utc>) -> Result<(), PositionError> {
        let (orders, unconfirmed) = {
            let ledger = self.ledger.lock().await;
            let mut orders = Vec::new();
            let mut unconfirmed = Vec::new();
            for position in ledger.book.active() {
                match (position.status, position.entry_order_id, position.exit_order_id) {
                    (PositionStatus::Opening, Some(id), _) => orders.push(id),
                    (PositionStatus::Opening, None, _) => unconfirmed.push(position.symbol.clone()),
                    (PositionStatus::Closing, _, Some(id)) => orders.push(id),
                    _ => {}
                }
            }
            (orders, unconfirmed)
        };

        for order_id in orders {
            self.sync_order(order_id, now).await?;
        }
        for symbol in unconfirmed {
            self.reconcile_unconfirmed(&symbol, now).await?;
        }
        Ok(())
    }

    /// Adopt or cancel an entry whose submission never returned an order id
    async fn reconcile_unconfirmed(&self, symbol: &str, now: DateTime<Utc>) -> Result<(), PositionError> {
        let exchange = match self
            .retry
            .run("get_position", || self.gateway.get_position(symbol))
            .await
        {
            Ok(position) => position,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Unconfirmed entry still unresolved");
                return Ok(());
            }
        };

        let mut ledger = self.ledger.lock().await;
        let Some(position) = ledger.book.get_mut(symbol) else {
            return Ok(());
        };
        if position.status != PositionStatus::Opening || position.entry_order_id.is_some() {
            return Ok(());
        }
        match exchange.filter(|p| p.side == position.side) {
            Some(found) => {
                position.quantity = found.quantity;
                position.entry_price = found.entry_price;
                position.size = found.quantity * found.entry_price;
                position.transition(PositionStatus::Open)?;
                increment_counter(CounterMetric::PositionOpened);
                tracing::info!(symbol, quantity = %found.quantity, "Adopted exchange position");
            }
            None => {
                ledger.cancel_entry(symbol, "submission never reached the exchange", now);
            }
        }
        Ok(())
    }
}
