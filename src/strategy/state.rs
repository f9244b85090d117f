//! Adaptive strategy state
//!
//! Each strategy is either Enabled or Disabled. An enabled strategy whose
//! rolling win rate over a full window drops below the floor is disabled for a
//! probation period; once it elapses the strategy is re-enabled with an empty
//! window. Weight tracks recent performance continuously in between.

use crate::config::StrategyConfig;
use crate::signal::StrategyId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Parameters governing enablement and weighting
#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    /// Rolling window capacity (K)
    pub window_size: usize,
    /// Win rate below which a full window disables the strategy
    pub win_rate_floor: Decimal,
    /// How long a disabled strategy sits out
    pub probation: Duration,
    /// Lower bound for recomputed weights
    pub min_weight: Decimal,
    /// Average PnL that maps to a full-scale performance score
    pub pnl_normalizer: Decimal,
}

impl AdaptivePolicy {
    /// Create from StrategyConfig
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            win_rate_floor: config.win_rate_floor,
            probation: Duration::seconds(config.probation_secs as i64),
            min_weight: config.min_weight,
            pnl_normalizer: config.pnl_normalizer,
        }
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            window_size: 20,
            win_rate_floor: dec!(0.3),
            probation: Duration::hours(1),
            min_weight: dec!(0.1),
            pnl_normalizer: dec!(100),
        }
    }
}

/// Whether a strategy participates in aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Enablement {
    Enabled,
    /// `until: None` means disabled by an operator, with no automatic return
    Disabled { until: Option<DateTime<Utc>> },
}

/// Enablement change produced by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enabled,
    Disabled { until: DateTime<Utc> },
}

/// Outcome of one closed trade, as remembered in the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub won: bool,
    pub pnl: Decimal,
}

/// Closed-trade result reported to the strategy manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeResult {
    /// Realized PnL after fees
    pub pnl: Decimal,
    /// When the trade closed
    pub closed_at: DateTime<Utc>,
}

impl TradeResult {
    pub fn outcome(&self) -> TradeOutcome {
        TradeOutcome {
            won: self.pnl > Decimal::ZERO,
            pnl: self.pnl,
        }
    }
}

/// Per-strategy adaptive state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub strategy_id: StrategyId,
    pub enablement: Enablement,
    /// Configured weight, restored on re-enable
    pub base_weight: Decimal,
    /// Current weight in [min_weight, 1]
    pub weight: Decimal,
    /// Most recent outcomes, oldest first
    pub rolling_trade_outcomes: VecDeque<TradeOutcome>,
    /// Lifetime counters
    pub total_trades: u64,
    pub total_wins: u64,
    pub total_pnl: Decimal,
}

impl StrategyState {
    /// Create an enabled state with the given base weight
    pub fn new(strategy_id: impl Into<StrategyId>, base_weight: Decimal) -> Self {
        let base_weight = base_weight.max(Decimal::ZERO).min(Decimal::ONE);
        Self {
            strategy_id: strategy_id.into(),
            enablement: Enablement::Enabled,
            base_weight,
            weight: base_weight,
            rolling_trade_outcomes: VecDeque::new(),
            total_trades: 0,
            total_wins: 0,
            total_pnl: Decimal::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enablement == Enablement::Enabled
    }

    /// End of the current probation, if any
    pub fn probation_until(&self) -> Option<DateTime<Utc>> {
        match self.enablement {
            Enablement::Disabled { until } => until,
            Enablement::Enabled => None,
        }
    }

    /// Win rate over the rolling window, `None` when empty
    pub fn win_rate(&self) -> Option<Decimal> {
        let n = self.rolling_trade_outcomes.len();
        if n == 0 {
            return None;
        }
        let wins = self.rolling_trade_outcomes.iter().filter(|o| o.won).count();
        Some(Decimal::from(wins) / Decimal::from(n))
    }

    /// Average PnL over the rolling window, `None` when empty
    pub fn average_pnl(&self) -> Option<Decimal> {
        let n = self.rolling_trade_outcomes.len();
        if n == 0 {
            return None;
        }
        let total: Decimal = self.rolling_trade_outcomes.iter().map(|o| o.pnl).sum();
        Some(total / Decimal::from(n))
    }

    /// Append an outcome, evicting the oldest beyond capacity, and apply the
    /// disable rule
    pub fn record(
        &mut self,
        outcome: TradeOutcome,
        policy: &AdaptivePolicy,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.rolling_trade_outcomes.push_back(outcome);
        while self.rolling_trade_outcomes.len() > policy.window_size {
            self.rolling_trade_outcomes.pop_front();
        }
        self.total_trades += 1;
        if outcome.won {
            self.total_wins += 1;
        }
        self.total_pnl += outcome.pnl;
        self.recompute_weight(policy);

        let window_full = self.rolling_trade_outcomes.len() >= policy.window_size;
        let below_floor = self.win_rate().is_some_and(|rate| rate < policy.win_rate_floor);
        if self.is_enabled() && window_full && below_floor {
            let until = now + policy.probation;
            self.enablement = Enablement::Disabled { until: Some(until) };
            return Some(Transition::Disabled { until });
        }
        None
    }

    /// Re-enable once probation has elapsed, starting a fresh trial window
    pub fn refresh(&mut self, policy: &AdaptivePolicy, now: DateTime<Utc>) -> Option<Transition> {
        match self.enablement {
            Enablement::Disabled { until: Some(until) } if until <= now => {
                self.enablement = Enablement::Enabled;
                self.rolling_trade_outcomes.clear();
                self.recompute_weight(policy);
                Some(Transition::Enabled)
            }
            _ => None,
        }
    }

    /// Weight from recent win rate and average PnL, clamped to [min_weight, 1]
    pub fn recompute_weight(&mut self, policy: &AdaptivePolicy) {
        let raw = match (self.win_rate(), self.average_pnl()) {
            (Some(win_rate), Some(avg_pnl)) => {
                let pnl_score = if policy.pnl_normalizer > Decimal::ZERO {
                    (avg_pnl / policy.pnl_normalizer)
                        .max(Decimal::NEGATIVE_ONE)
                        .min(Decimal::ONE)
                } else {
                    Decimal::ZERO
                };
                let score = dec!(0.5) * win_rate + dec!(0.5) * (dec!(0.5) + dec!(0.5) * pnl_score);
                self.base_weight * dec!(2) * score
            }
            _ => self.base_weight,
        };
        self.weight = raw.max(policy.min_weight).min(Decimal::ONE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(window: usize) -> AdaptivePolicy {
        AdaptivePolicy {
            window_size: window,
            ..AdaptivePolicy::default()
        }
    }

    fn loss() -> TradeOutcome {
        TradeOutcome {
            won: false,
            pnl: dec!(-10),
        }
    }

    fn win() -> TradeOutcome {
        TradeOutcome {
            won: true,
            pnl: dec!(10),
        }
    }

    #[test]
    fn test_new_state_is_enabled_with_base_weight() {
        let state = StrategyState::new("trend_following", dec!(0.6));
        assert!(state.is_enabled());
        assert_eq!(state.weight, dec!(0.6));
        assert_eq!(state.win_rate(), None);
        assert_eq!(state.probation_until(), None);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let policy = policy(3);
        let mut state = StrategyState::new("a", dec!(1));
        let now = Utc::now();
        state.record(win(), &policy, now);
        state.record(win(), &policy, now);
        state.record(win(), &policy, now);
        state.record(loss(), &policy, now);

        assert_eq!(state.rolling_trade_outcomes.len(), 3);
        assert_eq!(state.rolling_trade_outcomes.front(), Some(&win()));
        assert_eq!(state.rolling_trade_outcomes.back(), Some(&loss()));
        assert_eq!(state.total_trades, 4);
        assert_eq!(state.total_wins, 3);
    }

    #[test]
    fn test_not_disabled_before_window_full() {
        let policy = policy(5);
        let mut state = StrategyState::new("a", dec!(1));
        let now = Utc::now();
        for _ in 0..4 {
            assert_eq!(state.record(loss(), &policy, now), None);
        }
        assert!(state.is_enabled());
    }

    #[test]
    fn test_disabled_when_full_window_below_floor() {
        let policy = policy(5);
        let mut state = StrategyState::new("a", dec!(1));
        let now = Utc::now();
        for _ in 0..4 {
            state.record(loss(), &policy, now);
        }
        let transition = state.record(loss(), &policy, now);

        let until = now + policy.probation;
        assert_eq!(transition, Some(Transition::Disabled { until }));
        assert!(!state.is_enabled());
        assert_eq!(state.probation_until(), Some(until));
    }

    #[test]
    fn test_refresh_respects_probation() {
        let policy = policy(2);
        let mut state = StrategyState::new("a", dec!(0.8));
        let now = Utc::now();
        state.record(loss(), &policy, now);
        state.record(loss(), &policy, now);
        assert!(!state.is_enabled());

        // Further outcomes while disabled do not re-enable
        state.record(win(), &policy, now);
        assert_eq!(state.refresh(&policy, now + Duration::minutes(59)), None);
        assert!(!state.is_enabled());

        let transition = state.refresh(&policy, now + Duration::hours(1));
        assert_eq!(transition, Some(Transition::Enabled));
        assert!(state.is_enabled());
        assert!(state.rolling_trade_outcomes.is_empty());
        assert_eq!(state.weight, dec!(0.8));
    }

    #[test]
    fn test_operator_disable_never_expires() {
        let policy = policy(2);
        let mut state = StrategyState::new("a", dec!(1));
        state.enablement = Enablement::Disabled { until: None };
        assert_eq!(state.refresh(&policy, Utc::now() + Duration::days(365)), None);
    }

    #[test]
    fn test_weight_declines_gradually() {
        let policy = policy(10);
        let mut state = StrategyState::new("a", dec!(1));
        let now = Utc::now();

        state.record(win(), &policy, now);
        assert_eq!(state.weight, dec!(1));

        state.record(loss(), &policy, now);
        // win rate 0.5, avg pnl 0 -> score 0.5 -> weight = base
        assert_eq!(state.weight, dec!(1));

        state.record(loss(), &policy, now);
        // win rate 1/3, avg pnl -10/3 -> pnl score -1/30
        // score = 1/6 + 0.5 * (0.5 - 1/60) = 0.40833.. -> weight 0.8166..
        assert!(state.weight > dec!(0.81) && state.weight < dec!(0.82));
        assert!(state.is_enabled());
    }

    #[test]
    fn test_weight_floor() {
        let policy = AdaptivePolicy {
            window_size: 50,
            min_weight: dec!(0.2),
            ..AdaptivePolicy::default()
        };
        let mut state = StrategyState::new("a", dec!(0.5));
        let now = Utc::now();
        for _ in 0..10 {
            state.record(
                TradeOutcome {
                    won: false,
                    pnl: dec!(-500),
                },
                &policy,
                now,
            );
        }
        assert_eq!(state.weight, dec!(0.2));
    }

    #[test]
    fn test_trade_result_outcome() {
        let result = TradeResult {
            pnl: dec!(0),
            closed_at: Utc::now(),
        };
        assert!(!result.outcome().won);
    }
}
