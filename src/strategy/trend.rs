//! Trend following
//!
//! Trades EMA 12/26 crossovers gated by RSI 14, plus trend continuation
//! when RSI pulls back against the prevailing trend.

use super::{ensure_history, Strategy, StrategyError};
use crate::feed::MarketSnapshot;
use crate::signal::{Direction, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// EMA crossover strategy
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    pub rsi_overbought: Decimal,
    pub rsi_oversold: Decimal,
    /// RSI below which an uptrend continuation is taken
    pub continuation_long_rsi: Decimal,
    /// RSI above which a downtrend continuation is taken
    pub continuation_short_rsi: Decimal,
    pub leverage: u32,
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            rsi_overbought: dec!(70),
            rsi_oversold: dec!(30),
            continuation_long_rsi: dec!(40),
            continuation_short_rsi: dec!(60),
            leverage: 5,
        }
    }
}

impl Strategy for TrendFollowing {
    fn id(&self) -> &str {
        "trend_following"
    }

    fn required_history(&self) -> usize {
        // slow EMA (26) plus settling bars
        36
    }

    fn produce_signal(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<Signal, StrategyError> {
        ensure_history(snapshot, self.required_history())?;
        let ind = &snapshot.indicators;
        let fast = ind.ema_fast.ok_or(StrategyError::MissingIndicator("ema_fast"))?;
        let slow = ind.ema_slow.ok_or(StrategyError::MissingIndicator("ema_slow"))?;
        let fast_prev = ind.ema_fast_prev.ok_or(StrategyError::MissingIndicator("ema_fast_prev"))?;
        let slow_prev = ind.ema_slow_prev.ok_or(StrategyError::MissingIndicator("ema_slow_prev"))?;
        let rsi = ind.rsi.ok_or(StrategyError::MissingIndicator("rsi"))?;

        let bullish_cross = fast_prev <= slow_prev && fast > slow;
        let bearish_cross = fast_prev >= slow_prev && fast < slow;

        let signal = if bullish_cross {
            if rsi < self.rsi_overbought {
                let confidence = (dec!(0.5) + (self.rsi_overbought - rsi) / dec!(100)).min(dec!(0.9));
                Signal::new(self.id(), symbol, Direction::Long, Decimal::ONE, confidence)
                    .with_reason(format!("Bullish EMA crossover, RSI {:.1}", rsi))
            } else {
                Signal::neutral(self.id(), symbol)
            }
        } else if bearish_cross {
            if rsi > self.rsi_oversold {
                let confidence = (dec!(0.5) + (rsi - self.rsi_oversold) / dec!(100)).min(dec!(0.9));
                Signal::new(self.id(), symbol, Direction::Short, Decimal::ONE, confidence)
                    .with_reason(format!("Bearish EMA crossover, RSI {:.1}", rsi))
            } else {
                Signal::neutral(self.id(), symbol)
            }
        } else if fast > slow && rsi < self.continuation_long_rsi {
            Signal::new(self.id(), symbol, Direction::Long, dec!(0.6), dec!(0.6))
                .with_reason(format!("Uptrend with oversold RSI {:.1}", rsi))
        } else if fast < slow && rsi > self.continuation_short_rsi {
            Signal::new(self.id(), symbol, Direction::Short, dec!(0.6), dec!(0.6))
                .with_reason(format!("Downtrend with overbought RSI {:.1}", rsi))
        } else {
            Signal::neutral(self.id(), symbol)
        };

        Ok(signal.with_leverage(self.leverage).at(snapshot.timestamp))
    }
}
