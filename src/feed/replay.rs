//! Candle replay feed
//!
//! Replays recorded candles one bar per snapshot request. Snapshots are
//! stamped with the delivery time so the engine treats them as live data.

use super::{FeedError, MarketDataFeed, MarketSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

/// Default number of bars handed to strategies
const DEFAULT_HISTORY_LEN: usize = 150;

/// One recorded bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Feed replaying per-symbol candle series
pub struct ReplayFeed {
    series: HashMap<String, Vec<Candle>>,
    cursors: Mutex<HashMap<String, usize>>,
    history_len: usize,
}

impl ReplayFeed {
    /// Create a feed from in-memory series
    pub fn new(series: HashMap<String, Vec<Candle>>) -> Self {
        Self {
            series,
            cursors: Mutex::new(HashMap::new()),
            history_len: DEFAULT_HISTORY_LEN,
        }
    }

    /// Set the number of bars in each snapshot's history
    pub fn with_history_len(mut self, history_len: usize) -> Self {
        self.history_len = history_len.max(1);
        self
    }

    /// Load every `<SYMBOL>.jsonl` file in a directory
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut series = HashMap::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            let candles = content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str::<Candle>)
                .collect::<Result<Vec<_>, _>>()?;
            tracing::info!(symbol, bars = candles.len(), "Loaded replay series");
            series.insert(symbol.to_string(), candles);
        }
        Ok(Self::new(series))
    }

    /// Symbols available for replay
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Whether every series has been fully replayed
    pub async fn is_exhausted(&self) -> bool {
        let cursors = self.cursors.lock().await;
        self.series.iter().all(|(symbol, candles)| {
            cursors.get(symbol).copied().unwrap_or(0) >= candles.len()
        })
    }

    fn start_index(&self, len: usize) -> usize {
        self.history_len.min(len).saturating_sub(1)
    }

    fn window(&self, candles: &[Candle], index: usize) -> (Vec<Decimal>, Vec<Decimal>) {
        let start = (index + 1).saturating_sub(self.history_len);
        let bars = &candles[start..=index];
        (
            bars.iter().map(|c| c.close).collect(),
            bars.iter().map(|c| c.volume).collect(),
        )
    }
}

#[async_trait]
impl MarketDataFeed for ReplayFeed {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, FeedError> {
        let candles = self
            .series
            .get(symbol)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FeedError::NoData(symbol.to_string()))?;

        let mut cursors = self.cursors.lock().await;
        let cursor = cursors
            .entry(symbol.to_string())
            .or_insert_with(|| self.start_index(candles.len()));
        if *cursor >= candles.len() {
            return Err(FeedError::NoData(symbol.to_string()));
        }
        let index = *cursor;
        *cursor += 1;
        drop(cursors);

        let (closes, volumes) = self.window(candles, index);
        Ok(MarketSnapshot::from_history(symbol, closes, volumes, Utc::now()))
    }

    async fn select_tradable_symbols(&self, min_volume: Decimal) -> Result<Vec<String>, FeedError> {
        let cursors = self.cursors.lock().await;
        let mut ranked: Vec<(String, Decimal)> = self
            .series
            .iter()
            .filter(|(_, candles)| !candles.is_empty())
            .map(|(symbol, candles)| {
                let index = cursors
                    .get(symbol)
                    .copied()
                    .unwrap_or_else(|| self.start_index(candles.len()))
                    .min(candles.len() - 1);
                let start = (index + 1).saturating_sub(24);
                let volume: Decimal = candles[start..=index]
                    .iter()
                    .map(|c| c.close * c.volume)
                    .sum();
                (symbol.clone(), volume)
            })
            .filter(|(_, volume)| *volume >= min_volume)
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().map(|(symbol, _)| symbol).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn candles(prices: &[i64], volume: Decimal) -> Vec<Candle> {
        prices
            .iter()
            .map(|p| Candle {
                close: Decimal::from(*p),
                volume,
                timestamp: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_replay_advances_one_bar_per_snapshot() {
        let mut series = HashMap::new();
        series.insert("XBTUSDTM".to_string(), candles(&[1, 2, 3, 4, 5], dec!(1)));
        let feed = ReplayFeed::new(series).with_history_len(3);

        let first = feed.get_snapshot("XBTUSDTM").await.unwrap();
        assert_eq!(first.closes, vec![dec!(1), dec!(2), dec!(3)]);
        let second = feed.get_snapshot("XBTUSDTM").await.unwrap();
        assert_eq!(second.price, dec!(4));
        assert_eq!(second.closes.len(), 3);

        feed.get_snapshot("XBTUSDTM").await.unwrap();
        assert!(feed.is_exhausted().await);
        let result = feed.get_snapshot("XBTUSDTM").await;
        assert!(matches!(result, Err(FeedError::NoData(_))));
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let feed = ReplayFeed::new(HashMap::new());
        let result = feed.get_snapshot("DOGEUSDTM").await;
        assert!(matches!(result, Err(FeedError::NoData(_))));
    }

    #[tokio::test]
    async fn test_select_tradable_symbols_ranks_by_volume() {
        let mut series = HashMap::new();
        series.insert("XBTUSDTM".to_string(), candles(&[100; 30], dec!(50)));
        series.insert("ETHUSDTM".to_string(), candles(&[10; 30], dec!(50)));
        series.insert("DOGEUSDTM".to_string(), candles(&[1; 30], dec!(1)));
        let feed = ReplayFeed::new(series).with_history_len(24);

        let symbols = feed.select_tradable_symbols(dec!(1000)).await.unwrap();
        assert_eq!(symbols, vec!["XBTUSDTM".to_string(), "ETHUSDTM".to_string()]);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("XBTUSDTM.jsonl")).unwrap();
        writeln!(file, r#"{{"close": "100.5", "volume": "12"}}"#).unwrap();
        writeln!(file, r#"{{"close": 101, "volume": 3}}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let feed = ReplayFeed::load_dir(dir.path()).unwrap();
        assert_eq!(feed.symbols(), vec!["XBTUSDTM".to_string()]);
    }
}
