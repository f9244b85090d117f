//! Signal module
//!
//! Directional opinions produced by strategies and their weighted aggregate

mod types;

pub use types::{AggregatedSignal, Direction, Side, Signal, StrategyId, WeightedSignal};
