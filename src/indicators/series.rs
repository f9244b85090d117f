//! Indicator series calculations

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Bollinger band levels at the latest bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

/// Simple moving average series
pub fn sma(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period {
        return vec![];
    }
    let divisor = Decimal::from(period);
    values
        .windows(period)
        .map(|w| w.iter().sum::<Decimal>() / divisor)
        .collect()
}

/// Exponential moving average series, seeded with the SMA of the first `period` values
pub fn ema(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period {
        return vec![];
    }
    let multiplier = dec!(2) / Decimal::from(period + 1);
    let seed = values[..period].iter().sum::<Decimal>() / Decimal::from(period);

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    for value in &values[period..] {
        let prev = out[out.len() - 1];
        out.push((*value - prev) * multiplier + prev);
    }
    out
}

/// Relative strength index with Wilder smoothing
pub fn rsi(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period + 1 {
        return vec![];
    }
    let deltas: Vec<Decimal> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |d: &Decimal| if *d > Decimal::ZERO { *d } else { Decimal::ZERO };
    let loss = |d: &Decimal| if *d < Decimal::ZERO { -*d } else { Decimal::ZERO };

    let p = Decimal::from(period);
    let mut avg_gain = deltas[..period].iter().map(gain).sum::<Decimal>() / p;
    let mut avg_loss = deltas[..period].iter().map(loss).sum::<Decimal>() / p;

    let strength = |avg_gain: Decimal, avg_loss: Decimal| {
        if avg_loss == Decimal::ZERO {
            dec!(100)
        } else {
            dec!(100) - dec!(100) / (Decimal::ONE + avg_gain / avg_loss)
        }
    };

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    out.push(strength(avg_gain, avg_loss));
    for delta in &deltas[period..] {
        avg_gain = (avg_gain * (p - Decimal::ONE) + gain(delta)) / p;
        avg_loss = (avg_loss * (p - Decimal::ONE) + loss(delta)) / p;
        out.push(strength(avg_gain, avg_loss));
    }
    out
}

/// Population standard deviation
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let n = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / n;
    let variance = values.iter().map(|v| (*v - mean) * (*v - mean)).sum::<Decimal>() / n;
    let variance: f64 = variance.try_into().ok()?;
    Decimal::try_from(variance.sqrt()).ok()
}

/// Bollinger bands at the latest bar
pub fn bollinger(values: &[Decimal], period: usize, width: Decimal) -> Option<Bands> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let middle = window.iter().sum::<Decimal>() / Decimal::from(period);
    let sd = std_dev(window)?;
    Some(Bands {
        upper: middle + width * sd,
        middle,
        lower: middle - width * sd,
    })
}

/// Average true range at the latest bar
///
/// Only closes are available, so highs and lows are approximated as close +/- 1%.
pub fn atr(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let high = |c: Decimal| c * dec!(1.01);
    let low = |c: Decimal| c * dec!(0.99);

    let true_ranges: Vec<Decimal> = closes
        .windows(2)
        .map(|w| {
            let (prev, cur) = (w[0], w[1]);
            (high(cur) - low(cur))
                .max((high(cur) - prev).abs())
                .max((low(cur) - prev).abs())
        })
        .collect();

    let p = Decimal::from(period);
    let mut value = true_ranges[..period].iter().sum::<Decimal>() / p;
    for tr in &true_ranges[period..] {
        value = (value * (p - Decimal::ONE) + *tr) / p;
    }
    Some(value)
}

/// Z-score of the last value against the whole series
pub fn z_score(values: &[Decimal]) -> Option<Decimal> {
    let last = *values.last()?;
    let mean = values.iter().sum::<Decimal>() / Decimal::from(values.len());
    let sd = std_dev(values)?;
    if sd == Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    Some((last - mean) / sd)
}

/// Latest volume relative to the trailing average
pub fn volume_ratio(volumes: &[Decimal], period: usize) -> Option<Decimal> {
    let last = *volumes.last()?;
    if period == 0 || volumes.len() < period {
        return Some(Decimal::ONE);
    }
    let avg = volumes[volumes.len() - period..].iter().sum::<Decimal>() / Decimal::from(period);
    if avg <= Decimal::ZERO {
        return Some(Decimal::ONE);
    }
    Some(last / avg)
}

/// Coefficient of variation of the last `period` closes
pub fn volatility(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<Decimal>() / Decimal::from(period);
    if mean == Decimal::ZERO {
        return None;
    }
    Some(std_dev(window)? / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_sma() {
        let s = sma(&series(&[1, 2, 3, 4, 5]), 3);
        assert_eq!(s, vec![dec!(2), dec!(3), dec!(4)]);
        assert!(sma(&series(&[1, 2]), 3).is_empty());
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let e = ema(&series(&[2, 4, 6, 8]), 3);
        // seed = 4, multiplier = 0.5 -> (8 - 4) * 0.5 + 4 = 6
        assert_eq!(e, vec![dec!(4), dec!(6)]);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let values = series(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let r = rsi(&values, 3);
        assert_eq!(r.len(), 5);
        assert!(r.iter().all(|v| *v == dec!(100)));
    }

    #[test]
    fn test_rsi_starts_at_seed() {
        // gains 1, 1 and loss 1 over the first period: rs = 2
        let r = rsi(&series(&[1, 2, 3, 2]), 3);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].round_dp(2), dec!(66.67));
        assert!(rsi(&series(&[1, 2, 3]), 3).is_empty());
    }

    #[test]
    fn test_rsi_bounded() {
        let values = series(&[10, 12, 11, 13, 12, 9, 8, 10, 11, 7, 6]);
        let r = rsi(&values, 4);
        assert!(!r.is_empty());
        assert!(r.iter().all(|v| *v >= dec!(0) && *v <= dec!(100)));
    }

    #[test]
    fn test_std_dev_and_z_score() {
        let values = series(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(std_dev(&values), Some(dec!(2)));
        // mean 5, last 9 -> z = 2
        assert_eq!(z_score(&values), Some(dec!(2)));
        assert_eq!(z_score(&series(&[3, 3, 3])), Some(dec!(0)));
        assert_eq!(z_score(&[]), None);
    }

    #[test]
    fn test_bollinger_flat_series() {
        let bands = bollinger(&series(&[5, 5, 5, 5]), 4, dec!(2)).unwrap();
        assert_eq!(bands.upper, dec!(5));
        assert_eq!(bands.lower, dec!(5));
        assert!(bollinger(&series(&[5, 5]), 4, dec!(2)).is_none());
    }

    #[test]
    fn test_atr_flat_series() {
        // Flat closes -> true range is the synthetic 2% high/low band
        let atr_value = atr(&series(&[100, 100, 100, 100]), 3).unwrap();
        assert_eq!(atr_value, dec!(2));
    }

    #[test]
    fn test_volume_ratio() {
        let ratio = volume_ratio(&series(&[10, 10, 10, 30]), 4).unwrap();
        assert_eq!(ratio, dec!(2));
        assert_eq!(volume_ratio(&series(&[0, 0]), 2), Some(dec!(1)));
    }

    #[test]
    fn test_volatility_zero_for_flat() {
        assert_eq!(volatility(&series(&[7, 7, 7]), 3), Some(dec!(0)));
    }
}
