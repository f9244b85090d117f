//! Market data types

use crate::indicators;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market data feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Timeout or server-side failure, worth retrying
    #[error("Transient feed failure: {0}")]
    Transient(String),
    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Snapshot older than one update interval
    #[error("Stale snapshot for {symbol}: {age_secs}s old")]
    Stale { symbol: String, age_secs: i64 },
    /// No data available for the symbol
    #[error("No market data for {0}")]
    NoData(String),
}

impl FeedError {
    /// Whether the failure should be retried within the cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::Transient(_))
    }
}

/// Indicator values attached to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// Fast EMA (12) at the latest and previous bar
    pub ema_fast: Option<Decimal>,
    pub ema_fast_prev: Option<Decimal>,
    /// Slow EMA (26) at the latest and previous bar
    pub ema_slow: Option<Decimal>,
    pub ema_slow_prev: Option<Decimal>,
    /// RSI (14)
    pub rsi: Option<Decimal>,
    /// RSI (7)
    pub rsi_fast: Option<Decimal>,
    /// Bollinger bands (20, 2)
    pub bb_upper: Option<Decimal>,
    pub bb_middle: Option<Decimal>,
    pub bb_lower: Option<Decimal>,
    /// Average true range (14)
    pub atr: Option<Decimal>,
    /// Latest volume over 20-bar average
    pub volume_ratio: Option<Decimal>,
    /// Std/mean of the last 20 closes
    pub volatility: Option<Decimal>,
}

impl Indicators {
    /// Compute the standard indicator set from close and volume history
    pub fn compute(closes: &[Decimal], volumes: &[Decimal]) -> Self {
        let fast = indicators::ema(closes, 12);
        let slow = indicators::ema(closes, 26);
        let bands = indicators::bollinger(closes, 20, dec!(2));

        Self {
            ema_fast: fast.last().copied(),
            ema_fast_prev: fast.len().checked_sub(2).map(|i| fast[i]),
            ema_slow: slow.last().copied(),
            ema_slow_prev: slow.len().checked_sub(2).map(|i| slow[i]),
            rsi: indicators::rsi(closes, 14).last().copied(),
            rsi_fast: indicators::rsi(closes, 7).last().copied(),
            bb_upper: bands.map(|b| b.upper),
            bb_middle: bands.map(|b| b.middle),
            bb_lower: bands.map(|b| b.lower),
            atr: indicators::atr(closes, 14),
            volume_ratio: indicators::volume_ratio(volumes, 20),
            volatility: indicators::volatility(closes, 20),
        }
    }
}

/// A point-in-time view of one symbol's market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Trading symbol (e.g. "XBTUSDTM")
    pub symbol: String,
    /// Last price
    pub price: Decimal,
    /// Traded quote volume over the trailing day
    pub volume_24h: Decimal,
    /// Close history, oldest first, ending with `price`
    pub closes: Vec<Decimal>,
    /// Volume history aligned with `closes`
    pub volumes: Vec<Decimal>,
    /// Indicators computed over the history
    pub indicators: Indicators,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Build a snapshot from history, computing indicators
    pub fn from_history(
        symbol: impl Into<String>,
        closes: Vec<Decimal>,
        volumes: Vec<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let price = closes.last().copied().unwrap_or_default();
        let tail = closes.len().saturating_sub(24);
        let volume_24h = closes[tail..]
            .iter()
            .zip(volumes.get(tail..).unwrap_or_default())
            .map(|(c, v)| *c * *v)
            .sum();
        let indicators = Indicators::compute(&closes, &volumes);

        Self {
            symbol: symbol.into(),
            price,
            volume_24h,
            closes,
            volumes,
            indicators,
            timestamp,
        }
    }

    /// Snapshot age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether the snapshot is older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}
