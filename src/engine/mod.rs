//! Engine driver
//!
//! Ties the feed, strategy manager, risk controller and position manager
//! into a periodic loop

mod driver;
mod types;

pub use driver::TradingEngine;
pub use types::{CycleReport, EngineError};
