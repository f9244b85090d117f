//! Strategy manager
//!
//! Aggregates the signals of all enabled strategies into one decision per
//! symbol and adapts strategy enablement and weight from trade outcomes.

use super::state::{AdaptivePolicy, Enablement, StrategyState, TradeResult, Transition};
use super::{default_strategies, Strategy, StrategyError};
use crate::config::StrategyConfig;
use crate::feed::MarketSnapshot;
use crate::signal::{AggregatedSignal, Direction, Signal, StrategyId, WeightedSignal};
use crate::telemetry::{increment_counter, CounterMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Per-strategy statistics
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStats {
    pub strategy_id: StrategyId,
    pub enabled: bool,
    pub weight: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub total_pnl: Decimal,
    pub average_pnl: Decimal,
    pub win_rate: Decimal,
    pub probation_until: Option<DateTime<Utc>>,
}

struct Entry {
    strategy: Box<dyn Strategy>,
    state: StrategyState,
}

/// Owns the strategy plugins and their adaptive state
pub struct StrategyManager {
    entries: Vec<Entry>,
    policy: AdaptivePolicy,
    neutrality_threshold: Decimal,
}

impl StrategyManager {
    /// Create an empty manager
    pub fn new(policy: AdaptivePolicy, neutrality_threshold: Decimal) -> Self {
        Self {
            entries: vec![],
            policy,
            neutrality_threshold,
        }
    }

    /// Create the standard plugin set with per-plugin weight and enablement from config
    pub fn from_config(config: &StrategyConfig) -> Self {
        let mut manager = Self::new(AdaptivePolicy::from_config(config), config.neutrality_threshold);
        for strategy in default_strategies() {
            let plugin = config.plugin(strategy.id());
            let id = strategy.id().to_string();
            manager.register_with_weight(strategy, plugin.weight);
            if !plugin.enabled {
                manager.set_enabled(&id, false);
            }
        }
        manager
    }

    /// Register a strategy with full base weight
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.register_with_weight(strategy, Decimal::ONE);
    }

    /// Register a strategy with the given base weight
    pub fn register_with_weight(&mut self, strategy: Box<dyn Strategy>, weight: Decimal) {
        let mut state = StrategyState::new(strategy.id(), weight);
        state.recompute_weight(&self.policy);
        tracing::debug!(strategy = strategy.id(), weight = %state.weight, "Registered strategy");
        self.entries.push(Entry { strategy, state });
    }

    /// Aggregate all enabled strategies' signals for `symbol`
    pub fn evaluate(&self, symbol: &str, snapshot: &MarketSnapshot) -> AggregatedSignal {
        let mut net_score = Decimal::ZERO;
        let mut max_score = Decimal::ZERO;
        let mut contributing_signals = Vec::new();

        for entry in self.entries.iter().filter(|e| e.state.is_enabled()) {
            let signal = match entry.strategy.produce_signal(symbol, snapshot) {
                Ok(signal) => signal,
                Err(e) => {
                    log_strategy_failure(entry.strategy.id(), symbol, &e);
                    Signal::neutral(entry.strategy.id(), symbol)
                }
            };

            let weight = entry.state.weight;
            let contribution = signal.direction.sign() * signal.strength * signal.confidence * weight;
            net_score += contribution;
            max_score += weight;
            contributing_signals.push(WeightedSignal {
                signal,
                weight,
                contribution,
            });
        }

        let any_directional = contributing_signals
            .iter()
            .any(|w| w.signal.direction != Direction::Neutral);

        let direction = if !any_directional
            || net_score == Decimal::ZERO
            || net_score.abs() < self.neutrality_threshold
        {
            Direction::Neutral
        } else if net_score > Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };

        let strength = if direction == Direction::Neutral || max_score <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            (net_score.abs() / max_score).min(Decimal::ONE)
        };

        tracing::debug!(
            symbol,
            ?direction,
            net_score = %net_score,
            strength = %strength,
            signals = contributing_signals.len(),
            "Aggregated signals"
        );

        AggregatedSignal {
            symbol: symbol.to_string(),
            direction,
            net_score,
            strength,
            price: snapshot.price,
            contributing_signals,
            timestamp: snapshot.timestamp,
        }
    }

    /// Record a closed trade for one strategy
    ///
    /// Returns false if the strategy is unknown.
    pub fn record_outcome(&mut self, strategy_id: &str, result: &TradeResult) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.strategy.id() == strategy_id) else {
            tracing::warn!(strategy = strategy_id, "Outcome for unknown strategy");
            return false;
        };

        let transition = entry
            .state
            .record(result.outcome(), &self.policy, result.closed_at);
        if let Some(Transition::Disabled { until }) = transition {
            tracing::warn!(
                strategy = strategy_id,
                win_rate = %entry.state.win_rate().unwrap_or_default(),
                %until,
                "Strategy disabled for probation"
            );
            increment_counter(CounterMetric::StrategyDisabled);
        }
        true
    }

    /// Re-enable strategies whose probation has elapsed
    pub fn refresh_probation(&mut self, now: DateTime<Utc>) -> Vec<StrategyId> {
        let mut enabled = vec![];
        for entry in &mut self.entries {
            if entry.state.refresh(&self.policy, now) == Some(Transition::Enabled) {
                tracing::info!(strategy = entry.strategy.id(), "Strategy probation ended, re-enabled");
                enabled.push(entry.strategy.id().to_string());
            }
        }
        enabled
    }

    /// Manually enable or disable a strategy
    pub fn set_enabled(&mut self, strategy_id: &str, enabled: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.strategy.id() == strategy_id) else {
            return false;
        };
        entry.state.enablement = if enabled {
            Enablement::Enabled
        } else {
            Enablement::Disabled { until: None }
        };
        tracing::info!(strategy = strategy_id, enabled, "Strategy enablement set");
        true
    }

    /// State of one strategy
    pub fn state(&self, strategy_id: &str) -> Option<&StrategyState> {
        self.entries
            .iter()
            .find(|e| e.strategy.id() == strategy_id)
            .map(|e| &e.state)
    }

    /// Copy of every strategy state, for persistence
    pub fn snapshot(&self) -> Vec<StrategyState> {
        self.entries.iter().map(|e| e.state.clone()).collect()
    }

    /// Restore persisted states for registered strategies; unknown ids are ignored
    pub fn restore(&mut self, states: Vec<StrategyState>) {
        for state in states {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.strategy.id() == state.strategy_id)
            {
                entry.state = state;
            }
        }
    }

    /// Number of strategies currently participating
    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state.is_enabled()).count()
    }

    /// Per-strategy statistics
    pub fn stats(&self) -> Vec<StrategyStats> {
        self.entries
            .iter()
            .map(|e| {
                let s = &e.state;
                let trades = Decimal::from(s.total_trades);
                let (average_pnl, win_rate) = if s.total_trades > 0 {
                    (s.total_pnl / trades, Decimal::from(s.total_wins) / trades)
                } else {
                    (dec!(0), dec!(0))
                };
                StrategyStats {
                    strategy_id: s.strategy_id.clone(),
                    enabled: s.is_enabled(),
                    weight: s.weight,
                    total_trades: s.total_trades,
                    winning_trades: s.total_wins,
                    total_pnl: s.total_pnl,
                    average_pnl,
                    win_rate,
                    probation_until: s.probation_until(),
                }
            })
            .collect()
    }
}

fn log_strategy_failure(strategy: &str, symbol: &str, error: &StrategyError) {
    match error {
        StrategyError::InsufficientHistory { .. } => {
            tracing::debug!(strategy, symbol, error = %error, "Strategy skipped");
        }
        _ => {
            tracing::warn!(strategy, symbol, error = %error, "Strategy failed, treating as neutral");
            increment_counter(CounterMetric::StrategyFailure);
        }
    }
}
