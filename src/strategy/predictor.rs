//! Model-driven prediction
//!
//! `MlPredictor` turns a `Predictor`'s up-move probability into a signal.
//! The bundled `LogisticPredictor` is a fixed-coefficient scorer over a
//! nine-feature vector; other models plug in through the `Predictor` trait.

use super::{ensure_history, Strategy, StrategyError};
use crate::feed::MarketSnapshot;
use crate::signal::{Direction, Signal};
use rust_decimal::Decimal;

/// Number of features produced by [`features`]
pub const FEATURE_COUNT: usize = 9;

/// Model output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Probability that price moves up over the model horizon
    pub up_probability: f64,
}

/// Inference contract for prediction models
pub trait Predictor: Send + Sync {
    /// Predict from a feature vector, or None when the model abstains
    fn predict(&self, features: &[f64]) -> Option<Prediction>;
}

/// Logistic scorer with fixed coefficients
#[derive(Debug, Clone)]
pub struct LogisticPredictor {
    pub bias: f64,
    pub coefficients: [f64; FEATURE_COUNT],
}

impl Default for LogisticPredictor {
    fn default() -> Self {
        Self {
            bias: 0.0,
            // returns 5/10/20, rsi, band width, band position, volume, volatility, momentum
            coefficients: [25.0, 15.0, 8.0, -2.0, 0.0, -1.0, 0.0, 0.0, 10.0],
        }
    }
}

impl Predictor for LogisticPredictor {
    fn predict(&self, features: &[f64]) -> Option<Prediction> {
        if features.len() != FEATURE_COUNT || features.iter().any(|f| !f.is_finite()) {
            return None;
        }
        let z: f64 = self.bias
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, f)| c * f)
                .sum::<f64>();
        Some(Prediction {
            up_probability: 1.0 / (1.0 + (-z).exp()),
        })
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

fn pct_change(closes: &[Decimal], bars: usize) -> f64 {
    let n = closes.len();
    if n <= bars {
        return 0.0;
    }
    let base = closes[n - 1 - bars];
    if base.is_zero() {
        return 0.0;
    }
    to_f64((closes[n - 1] - base) / base)
}

/// Extract the model feature vector from a snapshot
///
/// Order: 5/10/20-bar returns, centred RSI, band width, centred band
/// position, capped volume ratio, volatility, 9-bar momentum.
pub fn features(snapshot: &MarketSnapshot) -> Vec<f64> {
    let ind = &snapshot.indicators;
    let price = snapshot.price;

    let rsi = ind.rsi.map(|r| to_f64(r) / 100.0).unwrap_or(0.5) - 0.5;

    let (bb_width, bb_position) = match (ind.bb_upper, ind.bb_middle, ind.bb_lower) {
        (Some(upper), Some(middle), Some(lower)) => {
            let width = if middle.is_zero() {
                0.0
            } else {
                to_f64((upper - lower) / middle)
            };
            let position = if upper == lower {
                0.5
            } else {
                to_f64((price - lower) / (upper - lower))
            };
            (width, position)
        }
        _ => (0.0, 0.5),
    };

    let volume_ratio = ind.volume_ratio.map(to_f64).unwrap_or(1.0).min(5.0);
    let volatility = ind.volatility.map(to_f64).unwrap_or(0.0);

    vec![
        pct_change(&snapshot.closes, 5),
        pct_change(&snapshot.closes, 10),
        pct_change(&snapshot.closes, 20),
        rsi,
        bb_width,
        bb_position - 0.5,
        volume_ratio,
        volatility,
        pct_change(&snapshot.closes, 9),
    ]
}

/// Strategy plugin wrapping a prediction model
pub struct MlPredictor {
    model: Box<dyn Predictor>,
    /// Minimum probability of the predicted direction
    pub prediction_threshold: f64,
    pub lookback: usize,
    pub leverage: u32,
}

impl MlPredictor {
    pub fn new(model: impl Predictor + 'static) -> Self {
        Self {
            model: Box::new(model),
            prediction_threshold: 0.6,
            lookback: 100,
            leverage: 5,
        }
    }
}

impl Strategy for MlPredictor {
    fn id(&self) -> &str {
        "ml_predictor"
    }

    fn required_history(&self) -> usize {
        self.lookback
    }

    fn produce_signal(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<Signal, StrategyError> {
        ensure_history(snapshot, self.required_history())?;

        let features = features(snapshot);
        let neutral = || {
            Signal::neutral(self.id(), symbol)
                .with_leverage(self.leverage)
                .at(snapshot.timestamp)
        };
        let Some(prediction) = self.model.predict(&features) else {
            return Ok(neutral());
        };

        let p = prediction.up_probability.clamp(0.0, 1.0);
        let (direction, probability) = if p >= self.prediction_threshold {
            (Direction::Long, p)
        } else if 1.0 - p >= self.prediction_threshold {
            (Direction::Short, 1.0 - p)
        } else {
            return Ok(neutral());
        };

        let strength = Decimal::try_from((p - 0.5).abs() * 2.0)
            .unwrap_or_default()
            .round_dp(4);
        let confidence = Decimal::try_from(probability).unwrap_or_default().round_dp(4);
        Ok(Signal::new(self.id(), symbol, direction, strength, confidence)
            .with_leverage(self.leverage)
            .with_reason(format!("Model up-probability {:.2}", p))
            .at(snapshot.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct Constant(Option<f64>);

    impl Predictor for Constant {
        fn predict(&self, _: &[f64]) -> Option<Prediction> {
            self.0.map(|up_probability| Prediction { up_probability })
        }
    }

    fn snapshot(closes: Vec<Decimal>) -> MarketSnapshot {
        let volumes = vec![dec!(1); closes.len()];
        MarketSnapshot::from_history("XBTUSDTM", closes, volumes, Utc::now())
    }

    fn flat() -> MarketSnapshot {
        snapshot(vec![dec!(100); 100])
    }

    #[test]
    fn test_feature_vector_for_flat_market() {
        let f = features(&flat());
        assert_eq!(f.len(), FEATURE_COUNT);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[4], 0.0);
        assert_eq!(f[5], 0.0);
        assert_eq!(f[6], 1.0);
    }

    #[test]
    fn test_logistic_zero_features_is_even() {
        let p = LogisticPredictor::default().predict(&[0.0; FEATURE_COUNT]).unwrap();
        assert!((p.up_probability - 0.5).abs() < 1e-9);
        assert!(LogisticPredictor::default().predict(&[0.0; 3]).is_none());
    }

    #[test]
    fn test_rising_market_predicts_long() {
        let closes: Vec<Decimal> = (0..100).map(|i| dec!(100) + Decimal::from(i)).collect();
        let signal = MlPredictor::new(LogisticPredictor::default())
            .produce_signal("XBTUSDTM", &snapshot(closes))
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.confidence >= dec!(0.6));
    }

    #[test]
    fn test_threshold_and_direction() {
        let long = MlPredictor::new(Constant(Some(0.8)))
            .produce_signal("XBTUSDTM", &flat())
            .unwrap();
        assert_eq!(long.direction, Direction::Long);
        assert_eq!(long.strength, dec!(0.6));

        let short = MlPredictor::new(Constant(Some(0.25)))
            .produce_signal("XBTUSDTM", &flat())
            .unwrap();
        assert_eq!(short.direction, Direction::Short);
        assert_eq!(short.confidence, dec!(0.75));

        let unsure = MlPredictor::new(Constant(Some(0.55)))
            .produce_signal("XBTUSDTM", &flat())
            .unwrap();
        assert_eq!(unsure.direction, Direction::Neutral);

        let abstain = MlPredictor::new(Constant(None))
            .produce_signal("XBTUSDTM", &flat())
            .unwrap();
        assert_eq!(abstain.direction, Direction::Neutral);
    }
}
