//! Strategy module
//!
//! Strategy plugins, their adaptive enablement state, and the manager that
//! aggregates their signals into one decision per symbol.

mod arbitrage;
mod manager;
mod predictor;
mod scalping;
mod state;
mod trend;

pub use arbitrage::StatisticalArbitrage;
pub use manager::{StrategyManager, StrategyStats};
pub use predictor::{LogisticPredictor, MlPredictor, Prediction, Predictor};
pub use scalping::Scalping;
pub use state::{AdaptivePolicy, Enablement, StrategyState, TradeOutcome, TradeResult, Transition};
pub use trend::TrendFollowing;

use crate::feed::MarketSnapshot;
use crate::signal::Signal;
use thiserror::Error;

/// Strategy evaluation errors
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Not enough bars in the snapshot
    #[error("Insufficient history: need {needed}, have {available}")]
    InsufficientHistory { needed: usize, available: usize },
    /// An indicator the strategy depends on is absent
    #[error("Missing indicator: {0}")]
    MissingIndicator(&'static str),
    /// Any other evaluation failure
    #[error("Strategy failure: {0}")]
    Internal(String),
}

/// Trait for strategy plugins
///
/// Implementations are pure: the same snapshot always yields the same signal.
pub trait Strategy: Send + Sync {
    /// Stable identifier used for configuration and performance tracking
    fn id(&self) -> &str;
    /// Number of bars required before the strategy can form an opinion
    fn required_history(&self) -> usize;
    /// Produce a signal for `symbol` from `snapshot`
    fn produce_signal(&self, symbol: &str, snapshot: &MarketSnapshot)
        -> Result<Signal, StrategyError>;
}

/// The standard plugin set: trend following, scalping, statistical arbitrage, ML prediction
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(TrendFollowing::default()),
        Box::new(Scalping::default()),
        Box::new(StatisticalArbitrage::default()),
        Box::new(MlPredictor::new(LogisticPredictor::default())),
    ]
}

/// Fail with `InsufficientHistory` when the snapshot is shorter than `needed`
pub(crate) fn ensure_history(snapshot: &MarketSnapshot, needed: usize) -> Result<(), StrategyError> {
    if snapshot.closes.len() < needed {
        return Err(StrategyError::InsufficientHistory {
            needed,
            available: snapshot.closes.len(),
        });
    }
    Ok(())
}
