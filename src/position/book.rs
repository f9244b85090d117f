//! Active positions and closed-trade history

use super::{ClosedTrade, PerformanceStats, Position, PositionError};
use crate::execution::OrderId;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// At most one non-terminal position per symbol, plus a bounded archive
#[derive(Debug, Clone)]
pub struct PositionBook {
    active: HashMap<String, Position>,
    history: VecDeque<ClosedTrade>,
    history_len: usize,
}

impl PositionBook {
    /// Create a book keeping up to `history_len` archived positions
    pub fn new(history_len: usize) -> Self {
        Self {
            active: HashMap::new(),
            history: VecDeque::with_capacity(history_len.min(1024)),
            history_len,
        }
    }

    /// Track a new position
    pub fn insert(&mut self, position: Position) -> Result<(), PositionError> {
        if self.active.contains_key(&position.symbol) {
            return Err(PositionError::AlreadyActive(position.symbol));
        }
        self.active.insert(position.symbol.clone(), position);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.active.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.active.get_mut(symbol)
    }

    /// Symbol of the position that owns `order_id`, and whether it is the entry order
    pub fn find_order(&self, order_id: OrderId) -> Option<(String, bool)> {
        self.active.values().find_map(|p| {
            if p.entry_order_id == Some(order_id) {
                Some((p.symbol.clone(), true))
            } else if p.exit_order_id == Some(order_id) {
                Some((p.symbol.clone(), false))
            } else {
                None
            }
        })
    }

    /// Non-terminal positions
    pub fn active(&self) -> impl Iterator<Item = &Position> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Remove a terminal position and archive it
    pub fn archive(&mut self, trade: ClosedTrade) {
        self.active.remove(&trade.position.symbol);
        if self.history_len == 0 {
            return;
        }
        while self.history.len() >= self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(trade);
    }

    /// Archived positions, oldest first
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &ClosedTrade> {
        self.history.iter()
    }

    /// Sum of mark-to-market PnL over active positions
    pub fn unrealized_pnl(&self) -> Decimal {
        self.active.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Statistics over archived closed trades; cancellations are excluded
    pub fn performance(&self) -> PerformanceStats {
        let closed: Vec<&ClosedTrade> = self.history.iter().filter(|t| t.is_closed()).collect();
        if closed.is_empty() {
            return PerformanceStats::default();
        }

        let total_trades = closed.len();
        let winning_trades = closed.iter().filter(|t| t.realized_pnl > Decimal::ZERO).count();
        let losing_trades = closed.iter().filter(|t| t.realized_pnl < Decimal::ZERO).count();
        let total_pnl: Decimal = closed.iter().map(|t| t.realized_pnl).sum();
        let count = Decimal::from(total_trades);

        PerformanceStats {
            total_trades,
            winning_trades,
            losing_trades,
            total_pnl,
            average_pnl: total_pnl / count,
            win_rate: Decimal::from(winning_trades) / count,
        }
    }
}
