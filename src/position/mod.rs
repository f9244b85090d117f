//! Position management
//!
//! Lifecycle tracking for leveraged positions: entry confirmation, stop and
//! target monitoring, closing, and settlement into the portfolio.

mod book;
mod manager;
mod types;

pub use book::PositionBook;
pub use manager::PositionManager;
pub use types::{
    crossed_threshold, monitor, ClosedTrade, ClosureEvent, ExitReason, PerformanceStats,
    Position, PositionError, PositionStatus,
};
