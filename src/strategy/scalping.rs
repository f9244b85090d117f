//! Scalping
//!
//! Bollinger band touches confirmed by a fast RSI and a volume surge, with
//! mean reversion fallbacks around the middle band.

use super::{ensure_history, Strategy, StrategyError};
use crate::feed::MarketSnapshot;
use crate::signal::{Direction, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Short-horizon band strategy
#[derive(Debug, Clone)]
pub struct Scalping {
    /// Minimum latest-volume / average-volume ratio for band entries
    pub volume_surge: Decimal,
    /// Band proximity tolerance (0.01 = within 1% of the band)
    pub band_tolerance: Decimal,
    /// Distance from the middle band that triggers mean reversion
    pub reversion_distance: Decimal,
    pub leverage: u32,
}

impl Default for Scalping {
    fn default() -> Self {
        Self {
            volume_surge: dec!(1.2),
            band_tolerance: dec!(0.01),
            reversion_distance: dec!(0.02),
            leverage: 10,
        }
    }
}

impl Strategy for Scalping {
    fn id(&self) -> &str {
        "scalping"
    }

    fn required_history(&self) -> usize {
        25
    }

    fn produce_signal(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<Signal, StrategyError> {
        ensure_history(snapshot, self.required_history())?;
        let ind = &snapshot.indicators;
        let upper = ind.bb_upper.ok_or(StrategyError::MissingIndicator("bb_upper"))?;
        let middle = ind.bb_middle.ok_or(StrategyError::MissingIndicator("bb_middle"))?;
        let lower = ind.bb_lower.ok_or(StrategyError::MissingIndicator("bb_lower"))?;
        let rsi = ind.rsi_fast.ok_or(StrategyError::MissingIndicator("rsi_fast"))?;
        let volume_ratio = ind.volume_ratio.unwrap_or(Decimal::ONE);
        let price = snapshot.price;
        let surge = volume_ratio > self.volume_surge;

        let signal = if price <= lower * (Decimal::ONE + self.band_tolerance) && rsi < dec!(30) {
            if surge {
                let confidence =
                    (dec!(0.5) + (dec!(30) - rsi) / dec!(60) + (volume_ratio - Decimal::ONE) / dec!(5))
                        .min(dec!(0.85));
                Signal::new(self.id(), symbol, Direction::Long, Decimal::ONE, confidence).with_reason(
                    format!("Price at lower band, RSI {:.1}, volume {:.1}x", rsi, volume_ratio),
                )
            } else {
                Signal::neutral(self.id(), symbol)
            }
        } else if price >= upper * (Decimal::ONE - self.band_tolerance) && rsi > dec!(70) {
            if surge {
                let confidence =
                    (dec!(0.5) + (rsi - dec!(70)) / dec!(60) + (volume_ratio - Decimal::ONE) / dec!(5))
                        .min(dec!(0.85));
                Signal::new(self.id(), symbol, Direction::Short, Decimal::ONE, confidence).with_reason(
                    format!("Price at upper band, RSI {:.1}, volume {:.1}x", rsi, volume_ratio),
                )
            } else {
                Signal::neutral(self.id(), symbol)
            }
        } else if price < middle * (Decimal::ONE - self.reversion_distance) && rsi < dec!(40) {
            Signal::new(self.id(), symbol, Direction::Long, dec!(0.5), dec!(0.55))
                .with_reason(format!("Mean reversion long, RSI {:.1}", rsi))
        } else if price > middle * (Decimal::ONE + self.reversion_distance) && rsi > dec!(60) {
            Signal::new(self.id(), symbol, Direction::Short, dec!(0.5), dec!(0.55))
                .with_reason(format!("Mean reversion short, RSI {:.1}", rsi))
        } else {
            Signal::neutral(self.id(), symbol)
        };

        Ok(signal.with_leverage(self.leverage).at(snapshot.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Indicators;
    use chrono::Utc;

    fn snapshot(price: Decimal, rsi: Decimal, volume_ratio: Decimal) -> MarketSnapshot {
        let mut snapshot =
            MarketSnapshot::from_history("ETHUSDTM", vec![price; 30], vec![dec!(1); 30], Utc::now());
        snapshot.indicators = Indicators {
            bb_upper: Some(dec!(110)),
            bb_middle: Some(dec!(100)),
            bb_lower: Some(dec!(90)),
            rsi_fast: Some(rsi),
            volume_ratio: Some(volume_ratio),
            ..Indicators::default()
        };
        snapshot
    }

    #[test]
    fn test_lower_band_with_volume_surge() {
        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(90), dec!(24), dec!(1.5)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        // 0.5 + 6/60 + 0.5/5 = 0.7
        assert_eq!(signal.confidence, dec!(0.7));
        assert_eq!(signal.recommended_leverage, Some(10));
    }

    #[test]
    fn test_band_touch_without_surge_is_neutral() {
        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(90), dec!(24), dec!(1.0)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn test_upper_band_confidence_capped() {
        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(111), dec!(95), dec!(3)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.confidence, dec!(0.85));
    }

    #[test]
    fn test_mean_reversion() {
        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(97), dec!(35), dec!(1)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.strength, dec!(0.5));
        assert_eq!(signal.confidence, dec!(0.55));

        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(103), dec!(65), dec!(1)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_quiet_market_is_neutral() {
        let signal = Scalping::default()
            .produce_signal("ETHUSDTM", &snapshot(dec!(100), dec!(50), dec!(1)))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
    }
}
