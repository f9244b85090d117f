//! Statistical arbitrage
//!
//! Mean reversion on the ratio of price to its rolling mean. The ratio
//! series is rebuilt from the snapshot history on every evaluation, so the
//! strategy holds no per-symbol state.

use super::{ensure_history, Strategy, StrategyError};
use crate::feed::MarketSnapshot;
use crate::indicators;
use crate::signal::{Direction, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Minimum ratio samples for a meaningful z-score
const MIN_RATIO_SAMPLES: usize = 20;

/// Price / rolling-mean z-score strategy
#[derive(Debug, Clone)]
pub struct StatisticalArbitrage {
    pub lookback: usize,
    /// |z| beyond which a position is entered against the deviation
    pub z_entry: Decimal,
    pub leverage: u32,
}

impl Default for StatisticalArbitrage {
    fn default() -> Self {
        Self {
            lookback: 100,
            z_entry: dec!(2),
            leverage: 3,
        }
    }
}

impl StatisticalArbitrage {
    /// Ratios of each close to the rolling mean ending at that close, most recent kept
    fn ratios(&self, closes: &[Decimal]) -> Vec<Decimal> {
        let means = indicators::sma(closes, self.lookback);
        let offset = self.lookback - 1;
        let ratios: Vec<Decimal> = means
            .iter()
            .enumerate()
            .filter(|(_, mean)| !mean.is_zero())
            .map(|(i, mean)| closes[i + offset] / *mean)
            .collect();
        let skip = ratios.len().saturating_sub(self.lookback.max(MIN_RATIO_SAMPLES));
        ratios[skip..].to_vec()
    }
}

impl Strategy for StatisticalArbitrage {
    fn id(&self) -> &str {
        "statistical_arbitrage"
    }

    fn required_history(&self) -> usize {
        self.lookback + MIN_RATIO_SAMPLES - 1
    }

    fn produce_signal(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<Signal, StrategyError> {
        if self.lookback == 0 {
            return Err(StrategyError::Internal("lookback must be positive".into()));
        }
        ensure_history(snapshot, self.required_history())?;

        let ratios = self.ratios(&snapshot.closes);
        if ratios.len() < MIN_RATIO_SAMPLES {
            return Err(StrategyError::InsufficientHistory {
                needed: self.required_history(),
                available: snapshot.closes.len(),
            });
        }
        let z = indicators::z_score(&ratios)
            .ok_or_else(|| StrategyError::Internal("z-score undefined".into()))?;

        let direction = if z < -self.z_entry {
            Direction::Long
        } else if z > self.z_entry {
            Direction::Short
        } else {
            return Ok(Signal::neutral(self.id(), symbol)
                .with_leverage(self.leverage)
                .at(snapshot.timestamp));
        };

        let strength = (z.abs() / (dec!(2) * self.z_entry)).min(Decimal::ONE);
        let confidence = (z.abs() / dec!(4)).min(dec!(0.8));
        Ok(Signal::new(self.id(), symbol, direction, strength, confidence)
            .with_leverage(self.leverage)
            .with_reason(format!("Ratio z-score {:.2}", z))
            .at(snapshot.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(closes: Vec<Decimal>) -> MarketSnapshot {
        let volumes = vec![dec!(1); closes.len()];
        MarketSnapshot::from_history("SOLUSDTM", closes, volumes, Utc::now())
    }

    fn strategy() -> StatisticalArbitrage {
        StatisticalArbitrage {
            lookback: 10,
            ..StatisticalArbitrage::default()
        }
    }

    #[test]
    fn test_required_history() {
        assert_eq!(StatisticalArbitrage::default().required_history(), 119);
        assert_eq!(strategy().required_history(), 29);
    }

    #[test]
    fn test_flat_series_is_neutral() {
        let signal = strategy().produce_signal("SOLUSDTM", &snapshot(vec![dec!(50); 40])).unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.recommended_leverage, Some(3));
    }

    #[test]
    fn test_spike_up_enters_short() {
        let mut closes = vec![dec!(50); 39];
        closes.push(dec!(60));
        let signal = strategy().produce_signal("SOLUSDTM", &snapshot(closes)).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.strength, dec!(1));
        assert_eq!(signal.confidence, dec!(0.8));
    }

    #[test]
    fn test_crash_enters_long() {
        let mut closes = vec![dec!(50); 39];
        closes.push(dec!(40));
        let signal = strategy().produce_signal("SOLUSDTM", &snapshot(closes)).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_insufficient_history() {
        let result = strategy().produce_signal("SOLUSDTM", &snapshot(vec![dec!(50); 20]));
        assert!(matches!(result, Err(StrategyError::InsufficientHistory { .. })));
    }
}
