//! Technical indicators
//!
//! Pure functions over closing-price and volume series. Feeds use them to
//! attach an [`Indicators`](crate::feed::Indicators) block to each snapshot.

mod series;

pub use series::{atr, bollinger, ema, rsi, sma, std_dev, volatility, volume_ratio, z_score, Bands};
