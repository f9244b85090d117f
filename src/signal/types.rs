//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strategy identifier (e.g. "trend_following")
pub type StrategyId = String;

/// Directional opinion of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Expect price to rise
    Long,
    /// Expect price to fall
    Short,
    /// No trade
    Neutral,
}

impl Direction {
    /// Signed unit for score arithmetic (+1, -1, 0)
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
            Direction::Neutral => Decimal::ZERO,
        }
    }

    /// Position side implied by this direction, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Neutral => None,
        }
    }
}

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Signed unit: +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Direction matching this side
    pub fn direction(&self) -> Direction {
        match self {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

/// A single strategy's opinion for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Producing strategy
    pub strategy_id: StrategyId,
    /// Trading symbol
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Magnitude of the opinion, in [0, 1]
    pub strength: Decimal,
    /// Confidence in the opinion, in [0, 1]
    pub confidence: Decimal,
    /// Leverage the strategy considers appropriate
    pub recommended_leverage: Option<u32>,
    /// Human-readable reason
    pub reason: String,
    /// Signal generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal, clamping strength and confidence into [0, 1]
    pub fn new(
        strategy_id: impl Into<StrategyId>,
        symbol: impl Into<String>,
        direction: Direction,
        strength: Decimal,
        confidence: Decimal,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            direction,
            strength: clamp_unit(strength),
            confidence: clamp_unit(confidence),
            recommended_leverage: None,
            reason: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// A no-trade signal with zero strength
    pub fn neutral(strategy_id: impl Into<StrategyId>, symbol: impl Into<String>) -> Self {
        Self::new(
            strategy_id,
            symbol,
            Direction::Neutral,
            Decimal::ZERO,
            Decimal::ZERO,
        )
    }

    /// Attach a recommended leverage
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.recommended_leverage = Some(leverage.max(1));
        self
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A signal together with the weight it was aggregated under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSignal {
    pub signal: Signal,
    /// Strategy weight at aggregation time
    pub weight: Decimal,
    /// direction_sign x strength x confidence x weight
    pub contribution: Decimal,
}

/// Weighted combination of all enabled strategies' signals for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSignal {
    /// Trading symbol
    pub symbol: String,
    /// Resulting direction
    pub direction: Direction,
    /// Signed sum of contributions
    pub net_score: Decimal,
    /// |net_score| normalized by the maximum possible contribution, in [0, 1]
    pub strength: Decimal,
    /// Reference price from the snapshot the signals were computed on
    pub price: Decimal,
    /// Every enabled strategy's signal, in registration order
    pub contributing_signals: Vec<WeightedSignal>,
    /// Aggregation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AggregatedSignal {
    /// A neutral aggregate with no contributions
    pub fn neutral(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            direction: Direction::Neutral,
            net_score: Decimal::ZERO,
            strength: Decimal::ZERO,
            price,
            contributing_signals: vec![],
            timestamp: Utc::now(),
        }
    }

    /// Strategies whose contribution has the same sign as `direction`
    pub fn supporting_strategies(&self, direction: Direction) -> Vec<StrategyId> {
        if direction == Direction::Neutral {
            return vec![];
        }
        self.contributing_signals
            .iter()
            .filter(|w| w.contribution != Decimal::ZERO)
            .filter(|w| w.contribution.is_sign_negative() == (direction == Direction::Short))
            .map(|w| w.signal.strategy_id.clone())
            .collect()
    }

    /// Most conservative leverage recommended by the supporting strategies
    pub fn recommended_leverage(&self) -> Option<u32> {
        let supporters = self.supporting_strategies(self.direction);
        self.contributing_signals
            .iter()
            .filter(|w| supporters.contains(&w.signal.strategy_id))
            .filter_map(|w| w.signal.recommended_leverage)
            .min()
    }
}

fn clamp_unit(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}
