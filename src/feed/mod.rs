//! Market data feed module
//!
//! Per-symbol price/indicator snapshots consumed by the decision engine

mod replay;
mod types;

pub use replay::{Candle, ReplayFeed};
pub use types::{FeedError, Indicators, MarketSnapshot};

use async_trait::async_trait;

/// Trait for market data feed implementations
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Latest snapshot for a symbol
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, FeedError>;
    /// Symbols whose traded volume is at least `min_volume`, most liquid first
    async fn select_tradable_symbols(&self, min_volume: rust_decimal::Decimal)
        -> Result<Vec<String>, FeedError>;
}
